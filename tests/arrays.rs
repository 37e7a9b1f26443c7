//! Array creation, element access, bounds and store compatibility.

use card_vm::prelude::*;

mod test_helpers;
use test_helpers::*;

#[test]
fn newarray_length_round_trip() {
    // sconst_0 ; newarray T_BYTE ; arraylength ; sreturn
    assert_returns_short(&[0x03, 0x90, 0x0b, 0x92, 0x78], 0);
}

#[test]
fn negative_length_faults() {
    // sconst_m1 ; newarray T_BYTE ; arraylength ; sreturn
    assert_uncaught(&[0x02, 0x90, 0x0b, 0x92, 0x78], Exception::NegativeArraySize);
}

#[test]
fn byte_elements_round_trip() {
    // sconst_2 ; newarray byte ; astore_0
    // aload_0 ; sconst_0 ; bspush 7 ; bastore
    // aload_0 ; sconst_0 ; baload ; sreturn
    let code = [
        0x05, 0x90, 0x0b, 0x2b, // allocate
        0x18, 0x03, 0x10, 0x07, 0x38, // store
        0x18, 0x03, 0x25, 0x78, // load
    ];
    assert_eq!(run_program(4, 1, &code), Ok(ReturnValue::Short(7)));
}

#[test]
fn byte_loads_sign_extend() {
    let code = [
        0x05, 0x90, 0x0b, 0x2b, // sconst_2 ; newarray byte ; astore_0
        0x18, 0x03, 0x10, 0x80, 0x38, // bspush 0x80 ; bastore
        0x18, 0x03, 0x25, 0x78, // baload ; sreturn
    ];
    assert_eq!(run_program(4, 1, &code), Ok(ReturnValue::Short(-128)));
}

#[test]
fn out_of_bounds_store_faults() {
    // array of length 2, bastore at index 7
    let code = [
        0x05, 0x90, 0x0b, 0x2b, // sconst_2 ; newarray byte ; astore_0
        0x18, 0x10, 0x07, 0x10, 0x05, 0x38, // aload_0 ; bspush 7 ; bspush 5 ; bastore
        0x03, 0x78,
    ];
    assert_eq!(
        run_program(4, 1, &code),
        Err(VmError::Uncaught(Exception::ArrayIndexOutOfBounds))
    );
}

#[test]
fn negative_index_faults() {
    let code = [
        0x05, 0x90, 0x0b, 0x2b, // sconst_2 ; newarray byte ; astore_0
        0x18, 0x02, 0x25, 0x78, // aload_0 ; sconst_m1 ; baload ; sreturn
    ];
    assert_eq!(
        run_program(4, 1, &code),
        Err(VmError::Uncaught(Exception::ArrayIndexOutOfBounds))
    );
}

#[test]
fn short_elements_round_trip() {
    // sconst_1 ; newarray short ; astore_0
    // aload_0 ; sconst_0 ; sspush 0x0203 ; sastore
    // aload_0 ; sconst_0 ; saload ; sreturn
    let code = [
        0x04, 0x90, 0x0c, 0x2b,
        0x18, 0x03, 0x11, 0x02, 0x03, 0x39,
        0x18, 0x03, 0x26, 0x78,
    ];
    assert_eq!(run_program(4, 1, &code), Ok(ReturnValue::Short(0x0203)));
}

#[test]
fn int_elements_round_trip() {
    // sconst_1 ; newarray int ; astore_0
    // aload_0 ; sconst_0 ; iipush 0x01020304 ; iastore
    // aload_0 ; sconst_0 ; iaload ; ireturn
    let code = [
        0x04, 0x90, 0x0d, 0x2b,
        0x18, 0x03, 0x14, 0x01, 0x02, 0x03, 0x04, 0x3a,
        0x18, 0x03, 0x27, 0x79,
    ];
    assert_eq!(run_program(4, 1, &code), Ok(ReturnValue::Int(0x0102_0304)));
}

#[test]
fn null_array_faults_before_the_bounds_check() {
    // aconst_null ; bspush 9 ; baload
    assert_uncaught(&[0x01, 0x10, 0x09, 0x25, 0x78], Exception::NullPointer);
}

#[test]
fn kind_confusion_faults_as_security() {
    // saload on a byte array
    let code = [
        0x04, 0x90, 0x0b, 0x2b, // sconst_1 ; newarray byte ; astore_0
        0x18, 0x03, 0x26, 0x78, // aload_0 ; sconst_0 ; saload ; sreturn
    ];
    assert_eq!(
        run_program(4, 1, &code),
        Err(VmError::Uncaught(Exception::Security))
    );
}

fn image_with_hierarchy() -> (ImageBuilder, u16, u16, u16) {
    let mut image = ImageBuilder::new(TEST_AID);
    let base = image.add_class(None, 0, (0, &[]), (0, &[]), &[]);
    let derived = image.add_class(Some(base), 0, (0, &[]), (0, &[]), &[]);
    let stranger = image.add_class(None, 0, (0, &[]), (0, &[]), &[]);
    (image, base, derived, stranger)
}

#[test]
fn compatible_reference_store_succeeds() {
    let (mut image, base, derived, _) = image_with_hierarchy();
    let base_cp = image.add_cp_class(base);
    let derived_cp = image.add_cp_class(derived);

    let [bh, bl] = base_cp.to_be_bytes();
    let [dh, dl] = derived_cp.to_be_bytes();

    // sconst_1 ; anewarray base ; astore_0
    // aload_0 ; sconst_0 ; new derived ; aastore
    // aload_0 ; sconst_0 ; aaload ; ifnonnull +4 ; sconst_0 ; sreturn ;
    // sconst_1 ; sreturn
    let code = [
        0x04, 0x91, bh, bl, 0x2b,
        0x18, 0x03, 0x8f, dh, dl, 0x37,
        0x18, 0x03, 0x24, 0x67, 0x04, 0x03, 0x78, 0x04, 0x78,
    ];
    let main = image.add_method(4, 0, 1, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(1))
    );
}

#[test]
fn incompatible_reference_store_faults() {
    let (mut image, base, _, stranger) = image_with_hierarchy();
    let base_cp = image.add_cp_class(base);
    let stranger_cp = image.add_cp_class(stranger);

    let [bh, bl] = base_cp.to_be_bytes();
    let [sh, sl] = stranger_cp.to_be_bytes();

    let code = [
        0x04, 0x91, bh, bl, 0x2b, // sconst_1 ; anewarray base ; astore_0
        0x18, 0x03, 0x8f, sh, sl, 0x37, // aastore of an unrelated class
        0x03, 0x78,
    ];
    let main = image.add_method(4, 0, 1, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Err(VmError::Uncaught(Exception::ArrayStore))
    );
}

#[test]
fn null_is_always_storable() {
    let (mut image, base, _, _) = image_with_hierarchy();
    let base_cp = image.add_cp_class(base);
    let [bh, bl] = base_cp.to_be_bytes();

    let code = [
        0x04, 0x91, bh, bl, 0x2b, // sconst_1 ; anewarray base ; astore_0
        0x18, 0x03, 0x01, 0x37, // aload_0 ; sconst_0 ; aconst_null ; aastore
        0x05, 0x78, // sconst_2 ; sreturn
    ];
    let main = image.add_method(4, 0, 1, &code);
    image.export_class(0, &[], &[main]);

    assert_eq!(
        vm_with(&image).run(APPLET, 0, 0, 0, true),
        Ok(ReturnValue::Short(2))
    );
}
