//! Object creation, field access, type checks and dispatch.

use card_vm::prelude::*;

mod test_helpers;
use test_helpers::*;

#[test]
fn instance_fields_round_trip() {
    let mut image = ImageBuilder::new(TEST_AID);
    let class = image.add_class(None, 2, (0, &[]), (0, &[]), &[]);
    let class_cp = image.add_cp_class(class);
    let field_cp = image.add_cp_instance_field(class, 0);

    let [ch, cl] = class_cp.to_be_bytes();
    let code = [
        0x8f, ch, cl, 0x2b, // new ; astore_0
        0x18, 0x11, 0x01, 0x02, 0x89, field_cp as u8, // aload_0 ; sspush ; putfield_s
        0x18, 0x85, field_cp as u8, 0x78, // aload_0 ; getfield_s ; sreturn
    ];
    let main = image.add_method(4, 0, 1, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(0x0102))
    );
}

#[test]
fn byte_fields_truncate_and_sign_extend() {
    let mut image = ImageBuilder::new(TEST_AID);
    let class = image.add_class(None, 1, (0, &[]), (0, &[]), &[]);
    let class_cp = image.add_cp_class(class);
    let field_cp = image.add_cp_instance_field(class, 0);

    let [ch, cl] = class_cp.to_be_bytes();
    let code = [
        0x8f, ch, cl, 0x2b, // new ; astore_0
        0x18, 0x11, 0x01, 0x80, 0x88, field_cp as u8, // sspush 0x0180 ; putfield_b
        0x18, 0x84, field_cp as u8, 0x78, // getfield_b ; sreturn
    ];
    let main = image.add_method(4, 0, 1, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(-128))
    );
}

#[test]
fn getfield_this_uses_local_zero() {
    let mut image = ImageBuilder::new(TEST_AID);
    let class = image.add_class(None, 1, (0, &[]), (0, &[]), &[]);
    let class_cp = image.add_cp_class(class);
    let field_cp = image.add_cp_instance_field(class, 0);

    // a virtual-style method: receiver in local 0
    //   sspush 0x0042 ; putfield_s_this ; getfield_s_this ; sreturn
    let body = [
        0x11, 0x00, 0x42, 0xb7, field_cp as u8,
        0xaf, field_cp as u8, 0x78,
    ];
    let callee = image.add_method(2, 1, 1, &body);
    let callee_cp = image.add_cp_static_method(callee);

    let [ch, cl] = class_cp.to_be_bytes();
    let [mh, ml] = callee_cp.to_be_bytes();
    // new ; invokespecial(static-ref form) ; sreturn
    let code = [0x8f, ch, cl, 0x8c, mh, ml, 0x78];
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(0x42))
    );
}

#[test]
fn instance_field_slots_offset_past_the_superclass() {
    let mut image = ImageBuilder::new(TEST_AID);
    let base = image.add_class(None, 1, (0, &[]), (0, &[]), &[]);
    let derived = image.add_class(Some(base), 1, (0, &[]), (0, &[]), &[]);
    let derived_cp = image.add_cp_class(derived);
    let base_field = image.add_cp_instance_field(base, 0);
    let derived_field = image.add_cp_instance_field(derived, 0);

    let [dh, dl] = derived_cp.to_be_bytes();
    let code = [
        0x8f, dh, dl, 0x2b, // new derived ; astore_0
        0x18, 0x11, 0x00, 0x05, 0x89, base_field as u8, // base slot <- 5
        0x18, 0x11, 0x00, 0x09, 0x89, derived_field as u8, // derived slot <- 9
        0x18, 0x85, base_field as u8, // getfield base
        0x18, 0x85, derived_field as u8, // getfield derived
        0x41, 0x78, // sadd ; sreturn
    ];
    let main = image.add_method(4, 0, 1, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(14))
    );
}

#[test]
fn virtual_dispatch_picks_the_receiver_override() {
    let mut image = ImageBuilder::new(TEST_AID);

    let base_impl = image.add_method(2, 1, 1, &[0x06, 0x78]); // sconst_3
    let derived_impl = image.add_method(2, 1, 1, &[0x08, 0x78]); // sconst_5

    let base = image.add_class(None, 0, (0, &[base_impl]), (0, &[]), &[]);
    let derived = image.add_class(Some(base), 0, (0, &[derived_impl]), (0, &[]), &[]);

    let base_cp = image.add_cp_class(base);
    let derived_cp = image.add_cp_class(derived);
    let method_cp = image.add_cp_virtual_method(base, 0);

    let [bh, bl] = base_cp.to_be_bytes();
    let [dh, dl] = derived_cp.to_be_bytes();
    let [mh, ml] = method_cp.to_be_bytes();

    // new base ; invokevirtual -> 3 ; new derived ; invokevirtual -> 5 ; sadd
    let code = [
        0x8f, bh, bl, 0x8b, mh, ml,
        0x8f, dh, dl, 0x8b, mh, ml,
        0x41, 0x78,
    ];
    let main = image.add_method(4, 0, 0, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(8))
    );
}

#[test]
fn virtual_dispatch_on_null_faults() {
    let mut image = ImageBuilder::new(TEST_AID);
    let implementation = image.add_method(2, 1, 1, &[0x06, 0x78]);
    let class = image.add_class(None, 0, (0, &[implementation]), (0, &[]), &[]);
    let _ = image.add_cp_class(class);
    let method_cp = image.add_cp_virtual_method(class, 0);

    let [mh, ml] = method_cp.to_be_bytes();
    let code = [0x01, 0x8b, mh, ml, 0x78]; // aconst_null ; invokevirtual
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Err(VmError::Uncaught(Exception::NullPointer))
    );
}

#[test]
fn interface_dispatch_remaps_tokens() {
    let mut image = ImageBuilder::new(TEST_AID);

    let implementation = image.add_method(2, 1, 1, &[0x07, 0x78]); // sconst_4
    let interface = image.add_interface(&[]);
    let class = image.add_class(
        None,
        0,
        (0, &[implementation]),
        (0, &[]),
        &[(interface, &[0])],
    );

    let class_cp = image.add_cp_class(class);
    let interface_cp = image.add_cp_class(interface);

    let [ch, cl] = class_cp.to_be_bytes();
    let [ih, il] = interface_cp.to_be_bytes();

    // new ; invokeinterface (cp, nargs = 1, token = 0) ; sreturn
    let code = [0x8f, ch, cl, 0x8e, ih, il, 0x01, 0x00, 0x78];
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(4))
    );
}

#[test]
fn super_invocation_skips_the_override() {
    let mut image = ImageBuilder::new(TEST_AID);

    let base_impl = image.add_method(2, 1, 1, &[0x06, 0x78]); // sconst_3
    let derived_impl = image.add_method(2, 1, 1, &[0x08, 0x78]); // sconst_5

    let base = image.add_class(None, 0, (0, &[base_impl]), (0, &[]), &[]);
    let derived = image.add_class(Some(base), 0, (0, &[derived_impl]), (0, &[]), &[]);

    let derived_cp = image.add_cp_class(derived);
    let super_cp = image.add_cp_super_method(derived, 0);

    let [dh, dl] = derived_cp.to_be_bytes();
    let [sh, sl] = super_cp.to_be_bytes();

    let code = [0x8f, dh, dl, 0x8c, sh, sl, 0x78]; // new derived ; invokespecial
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(3))
    );
}

fn type_check_image() -> (ImageBuilder, u16, u16, u16) {
    let mut image = ImageBuilder::new(TEST_AID);
    let base = image.add_class(None, 0, (0, &[]), (0, &[]), &[]);
    let derived = image.add_class(Some(base), 0, (0, &[]), (0, &[]), &[]);
    let stranger = image.add_class(None, 0, (0, &[]), (0, &[]), &[]);
    (image, base, derived, stranger)
}

#[test]
fn instanceof_respects_the_hierarchy() {
    let (mut image, base, derived, _) = type_check_image();
    let base_cp = image.add_cp_class(base);
    let derived_cp = image.add_cp_class(derived);

    let [bh, bl] = base_cp.to_be_bytes();
    let [dh, dl] = derived_cp.to_be_bytes();

    // new derived ; instanceof base -> 1
    let code = [0x8f, dh, dl, 0x95, 0x00, bh, bl, 0x78];
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);
    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(1))
    );
}

#[test]
fn instanceof_rejects_unrelated_classes() {
    let (mut image, base, _, stranger) = type_check_image();
    let base_cp = image.add_cp_class(base);
    let stranger_cp = image.add_cp_class(stranger);

    let [bh, bl] = base_cp.to_be_bytes();
    let [sh, sl] = stranger_cp.to_be_bytes();

    let code = [0x8f, sh, sl, 0x95, 0x00, bh, bl, 0x78];
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);
    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(0))
    );
}

#[test]
fn instanceof_on_null_pushes_zero() {
    let (mut image, base, _, _) = type_check_image();
    let base_cp = image.add_cp_class(base);
    let [bh, bl] = base_cp.to_be_bytes();

    let code = [0x01, 0x95, 0x00, bh, bl, 0x78];
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);
    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(0))
    );
}

#[test]
fn checkcast_passes_null_and_compatible_objects() {
    let (mut image, base, derived, _) = type_check_image();
    let base_cp = image.add_cp_class(base);
    let derived_cp = image.add_cp_class(derived);

    let [bh, bl] = base_cp.to_be_bytes();
    let [dh, dl] = derived_cp.to_be_bytes();

    // aconst_null ; checkcast base ; pop ;
    // new derived ; checkcast base ; pop ; sconst_1 ; sreturn
    let code = [
        0x01, 0x94, 0x00, bh, bl, 0x3b,
        0x8f, dh, dl, 0x94, 0x00, bh, bl, 0x3b,
        0x04, 0x78,
    ];
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);
    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(1))
    );
}

#[test]
fn checkcast_faults_on_incompatible_objects() {
    let (mut image, base, _, stranger) = type_check_image();
    let base_cp = image.add_cp_class(base);
    let stranger_cp = image.add_cp_class(stranger);

    let [bh, bl] = base_cp.to_be_bytes();
    let [sh, sl] = stranger_cp.to_be_bytes();

    let code = [0x8f, sh, sl, 0x94, 0x00, bh, bl, 0x3b, 0x03, 0x78];
    let main = image.add_method(2, 0, 0, &code);
    image.export_class(0, &[], &[main]);
    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Err(VmError::Uncaught(Exception::ClassCast))
    );
}

#[test]
fn array_type_checks_use_the_atype_operand() {
    // sconst_1 ; newarray byte ; instanceof T_BYTE -> 1
    assert_returns_short(&[0x04, 0x90, 0x0b, 0x95, 0x0b, 0x00, 0x00, 0x78], 1);
    // sconst_1 ; newarray byte ; instanceof T_SHORT -> 0
    assert_returns_short(&[0x04, 0x90, 0x0b, 0x95, 0x0c, 0x00, 0x00, 0x78], 0);
}
