//! Package-image reader structure and component views.

use card_vm::cap::{ComponentTag, PackageImage, PackageTable};
use card_vm::prelude::*;

mod test_helpers;
use test_helpers::*;

fn sample_image() -> ImageBuilder {
    let mut image = ImageBuilder::new(TEST_AID);
    let main = image.add_method(2, 0, 0, &[0x03, 0x78]);
    image.export_class(0, &[], &[main]);
    image.add_applet(&[0xa0, 0x00, 0x00, 0x06, 0x15, 0x01], main);
    image
}

#[test]
fn a_well_formed_image_parses() {
    let image = PackageImage::parse(0, sample_image().build()).unwrap();

    assert!(image.has_component(ComponentTag::Header));
    assert!(image.has_component(ComponentTag::Method));
    assert!(image.has_component(ComponentTag::Descriptor));

    let header = image.header().unwrap();
    assert_eq!(header.version(), (2, 1));
    assert!(header.int_supported());
    assert!(header.has_export());
    assert!(header.has_applet());
    assert_eq!(header.package().unwrap().aid().unwrap(), TEST_AID);
}

#[test]
fn duplicate_components_fault() {
    let mut bytes = sample_image().build();
    // append a second header component
    let duplicate = [1u8, 0x00, 0x01, 0x00];
    bytes.extend_from_slice(&duplicate);

    assert_eq!(PackageImage::parse(0, bytes), Err(Exception::Security));
}

#[test]
fn unknown_tags_fault() {
    let mut bytes = sample_image().build();
    bytes.extend_from_slice(&[12u8, 0x00, 0x00]);

    assert_eq!(PackageImage::parse(0, bytes), Err(Exception::Security));
}

#[test]
fn truncated_components_fault() {
    let mut bytes = sample_image().build();
    // declared length overruns the image
    bytes.truncate(bytes.len() - 1);

    assert_eq!(PackageImage::parse(0, bytes), Err(Exception::Security));
}

#[test]
fn a_wrong_magic_number_faults() {
    let mut bytes = sample_image().build();
    bytes[3] ^= 0xff; // first magic byte, after tag and size

    let image = PackageImage::parse(0, bytes).unwrap();
    assert_eq!(image.header().map(|_| ()), Err(Exception::Security));
}

#[test]
fn directory_reflects_the_image_counts() {
    let image = PackageImage::parse(0, sample_image().build()).unwrap();
    let directory = image.directory().unwrap();

    assert_eq!(directory.import_count().unwrap(), 0);
    assert_eq!(directory.applet_count().unwrap(), 1);
    assert_eq!(directory.static_field_image_size().unwrap(), 0);

    // the directory records each component's declared size
    let method = image.method_component().unwrap();
    assert_eq!(
        directory.component_size(6).unwrap() as usize,
        1 + method.region().unwrap().len()
    );
}

#[test]
fn applet_entries_expose_the_install_offset() {
    let image = PackageImage::parse(0, sample_image().build()).unwrap();
    let applets = image.applet().unwrap();

    assert_eq!(applets.count(), 1);
    let entry = applets.applet(0).unwrap();
    assert_eq!(entry.aid, &[0xa0, 0x00, 0x00, 0x06, 0x15, 0x01]);
    assert_eq!(entry.install_method_offset, 1);

    assert_eq!(applets.applet(1).map(|_| ()), Err(Exception::Security));
}

#[test]
fn export_lookup_is_token_indexed() {
    let image = PackageImage::parse(0, sample_image().build()).unwrap();
    let export = image.export().unwrap();

    assert_eq!(export.class_count(), 1);
    let class = export.class_export(0).unwrap();
    assert_eq!(class.static_method_count().unwrap(), 1);
    assert_eq!(class.static_method_offset(0).unwrap(), 1);
    assert_eq!(class.static_method_offset(1).map(|_| ()), Err(Exception::Security));
}

#[test]
fn constant_pool_entries_decode_by_kind() {
    let mut builder = sample_image();
    let class_cp = builder.add_cp_class(0x0010);
    let field_cp = builder.add_cp_instance_field(0x0010, 3);
    let static_cp = builder.add_cp_static_field(0x0102);

    let image = PackageImage::parse(0, builder.build()).unwrap();
    let pool = image.constant_pool().unwrap();

    assert!(matches!(
        pool.entry(class_cp).unwrap(),
        card_vm::cap::CpEntry::ClassRef(card_vm::cap::ClassRef::Internal(0x0010))
    ));
    assert!(matches!(
        pool.entry(field_cp).unwrap(),
        card_vm::cap::CpEntry::InstanceFieldRef { token: 3, .. }
    ));
    assert!(matches!(
        pool.entry(static_cp).unwrap(),
        card_vm::cap::CpEntry::StaticFieldRef(card_vm::cap::StaticRef::Internal(0x0102))
    ));

    assert_eq!(pool.entry(99).map(|_| ()), Err(Exception::Security));
}

#[test]
fn images_load_through_the_package_table() {
    let mut store = MemoryStorage::new();
    install(&mut store, 3, &sample_image());

    let mut table = PackageTable::new();
    assert!(table.get(3).is_err());

    let image = table.ensure(&store, 3).unwrap();
    assert_eq!(image.id(), 3);

    // a missing slot fails with an I/O-backed fault
    assert!(table.ensure(&store, 4).is_err());
}

#[test]
fn import_resolution_searches_by_aid() {
    let mut store = MemoryStorage::new();
    install(&mut store, 0, &sample_image());

    let other_aid = [0xa0, 0x00, 0x00, 0x06, 0x16];
    let mut other = ImageBuilder::new(&other_aid);
    let stub = other.add_method(1, 0, 0, &[0x7a]);
    other.export_class(0, &[], &[stub]);
    install(&mut store, 5, &other);

    let mut table = PackageTable::new();
    assert_eq!(table.find_by_aid(&store, &other_aid, 1, 0).unwrap(), 5);
    assert_eq!(table.find_by_aid(&store, TEST_AID, 1, 0).unwrap(), 0);
    assert_eq!(
        table.find_by_aid(&store, &[1, 2, 3], 1, 0),
        Err(Exception::Runtime)
    );
}

#[test]
fn the_non_static_entry_runs_the_install_method() {
    let mut image = ImageBuilder::new(TEST_AID);
    let install_method = image.add_method(2, 0, 0, &[0x7a]); // return
    image.add_applet(&[0xa0, 0x00, 0x00, 0x06, 0x15, 0x01], install_method);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, false),
        Ok(ReturnValue::Void)
    );
}
