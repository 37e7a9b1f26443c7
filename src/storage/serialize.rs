//! (De)serialization between live heap objects and store records.
//!
//! Records carry a leading field-type tag; instances and reference arrays
//! serialize their members recursively under child tags. Reads that find
//! no record, or the uninitialized tag, yield the zero value of the
//! requested type; reads whose stored type tag mismatches the requested
//! type fault as security.

use tracing::debug;

use super::{Store, Tag};
use crate::cap::PackageTable;
use crate::consts::NO_ELEMENT_CLASS;
use crate::error::Exception;
use crate::heap::Heap;
use crate::object::{ArrayBacking, ArrayKind, ArrayObject, ClearEvent, FieldValue, InstanceObject, StoredKind};
use crate::reference::Reference;
use crate::resolver::{self, ClassTarget};

fn record_of<'a, S>(store: &'a S, tag: &Tag) -> Result<Option<&'a [u8]>, Exception>
where
    S: Store + ?Sized,
{
    match store.read_in_place(tag) {
        Ok(record) if record.is_empty() => Ok(None),
        Ok(record) => Ok(Some(record)),
        Err(_) => Ok(None),
    }
}

/// Write the distinguished uninitialized record under `tag`.
pub fn write_uninitialized<S>(store: &mut S, tag: &Tag) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    store.write(tag, &[StoredKind::Uninitialized as u8])?;
    Ok(())
}

/// Read a byte or boolean scalar record.
pub fn read_byte_record<S>(store: &S, tag: &Tag) -> Result<i8, Exception>
where
    S: Store + ?Sized,
{
    match record_of(store, tag)? {
        None => Ok(0),
        Some(record) => match StoredKind::try_from(record[0])? {
            StoredKind::Uninitialized => Ok(0),
            StoredKind::Byte if record.len() >= 2 => Ok(record[1] as i8),
            _ => Err(Exception::Security),
        },
    }
}

/// Write a byte or boolean scalar record.
pub fn write_byte_record<S>(store: &mut S, tag: &Tag, value: i8) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    store.write(tag, &[StoredKind::Byte as u8, value as u8])?;
    Ok(())
}

/// Read a short scalar record.
pub fn read_short_record<S>(store: &S, tag: &Tag) -> Result<i16, Exception>
where
    S: Store + ?Sized,
{
    match record_of(store, tag)? {
        None => Ok(0),
        Some(record) => match StoredKind::try_from(record[0])? {
            StoredKind::Uninitialized => Ok(0),
            StoredKind::Short if record.len() >= 3 => {
                Ok(i16::from_be_bytes([record[1], record[2]]))
            }
            _ => Err(Exception::Security),
        },
    }
}

/// Write a short scalar record.
pub fn write_short_record<S>(store: &mut S, tag: &Tag, value: i16) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    let [hi, lo] = value.to_be_bytes();
    store.write(tag, &[StoredKind::Short as u8, hi, lo])?;
    Ok(())
}

/// Read an int scalar record.
pub fn read_int_record<S>(store: &S, tag: &Tag) -> Result<i32, Exception>
where
    S: Store + ?Sized,
{
    match record_of(store, tag)? {
        None => Ok(0),
        Some(record) => match StoredKind::try_from(record[0])? {
            StoredKind::Uninitialized => Ok(0),
            StoredKind::Int if record.len() >= 5 => Ok(i32::from_be_bytes([
                record[1], record[2], record[3], record[4],
            ])),
            _ => Err(Exception::Security),
        },
    }
}

/// Write an int scalar record.
pub fn write_int_record<S>(store: &mut S, tag: &Tag, value: i32) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    let [b0, b1, b2, b3] = value.to_be_bytes();
    store.write(tag, &[StoredKind::Int as u8, b0, b1, b2, b3])?;
    Ok(())
}

/// Materialize the object serialized under `tag` into the heap and return
/// its reference. A missing record or the uninitialized tag yields null.
pub fn read_reference<S>(
    store: &S,
    packages: &mut PackageTable,
    heap: &mut Heap,
    tag: &Tag,
) -> Result<Reference, Exception>
where
    S: Store + ?Sized,
{
    let Some(record) = record_of(store, tag)? else {
        return Ok(Reference::NULL);
    };

    let kind = StoredKind::try_from(record[0])?;
    let owner = heap.owner();

    let u16_at = |at: usize| -> Result<u16, Exception> {
        match record.get(at..at + 2) {
            Some([hi, lo]) => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(Exception::Security),
        }
    };

    match kind {
        StoredKind::Uninitialized => Ok(Reference::NULL),

        StoredKind::Instance => {
            let package = *record.get(1).ok_or(Exception::Security)?;
            let class_index = u16_at(2)?;
            let slots = resolver::instance_size(
                packages,
                store,
                ClassTarget {
                    package,
                    class_index,
                },
            )?;

            heap.add_instance(InstanceObject::stored(
                owner,
                package,
                class_index,
                slots,
                *tag,
            ))
        }

        kind if kind.is_array() => {
            let array_kind = ArrayKind::from_stored_kind(kind).ok_or(Exception::Security)?;
            let length = u16_at(1)?;

            let array = if kind.is_transient() {
                let clear = ClearEvent::try_from(*record.get(3).ok_or(Exception::Security)?)?;
                let element_class = if matches!(array_kind, ArrayKind::Reference) {
                    u16_at(4)?
                } else {
                    NO_ELEMENT_CLASS
                };

                ArrayObject::transient(owner, array_kind, element_class, length, clear)
            } else {
                let element_class = if matches!(array_kind, ArrayKind::Reference) {
                    u16_at(3)?
                } else {
                    NO_ELEMENT_CLASS
                };

                ArrayObject::stored(owner, array_kind, element_class, length, *tag)
            };

            heap.add_array(array)
        }

        // scalar record where an object was expected
        _ => Err(Exception::Security),
    }
}

fn array_header(array: &ArrayObject) -> Vec<u8> {
    let kind = array.kind().stored_kind(array.is_transient());
    let mut header = Vec::with_capacity(kind.header_len());

    header.push(kind as u8);
    header.extend_from_slice(&array.length().to_be_bytes());

    if array.is_transient() {
        header.push(array.clear_event() as u8);
    }
    if matches!(array.kind(), ArrayKind::Reference) {
        header.extend_from_slice(&array.element_class().to_be_bytes());
    }

    header
}

fn copy_record<S>(
    store: &mut S,
    packages: &mut PackageTable,
    src: &Tag,
    dst: &Tag,
) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    let Some(record) = record_of(store, src)?.map(<[u8]>::to_vec) else {
        return Ok(());
    };

    let kind = StoredKind::try_from(record[0])?;
    store.write(dst, &record)?;

    let children = match kind {
        StoredKind::ArrayReference => {
            u16::from_be_bytes([record[1], record[2]])
        }
        StoredKind::Instance => {
            let package = record[1];
            let class_index = u16::from_be_bytes([record[2], record[3]]);
            resolver::instance_size(
                packages,
                store,
                ClassTarget {
                    package,
                    class_index,
                },
            )?
        }
        _ => 0,
    };

    for index in 0..children {
        copy_record(store, packages, &src.child(index)?, &dst.child(index)?)?;
    }

    Ok(())
}

fn write_array<S>(
    store: &mut S,
    packages: &mut PackageTable,
    heap: &mut Heap,
    tag: &Tag,
    reference: Reference,
) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    let array = heap.array(reference)?;
    let length = array.length();
    let is_reference = matches!(array.kind(), ArrayKind::Reference);
    let transient = array.is_transient();
    let header = array_header(array);

    match array.backing().clone() {
        ArrayBacking::Stored(src) => {
            if src != *tag {
                copy_record(store, packages, &src, tag)?;
            }
            Ok(())
        }

        ArrayBacking::Volatile(buffer) => {
            if transient || is_reference {
                store.write(tag, &header)?;
            } else {
                let mut record = header;
                record.extend_from_slice(&buffer);
                store.write(tag, &record)?;
            }

            if is_reference && !transient {
                for index in 0..length {
                    let element = Reference::from_compact(u16::from_be_bytes([
                        buffer[index as usize * 2],
                        buffer[index as usize * 2 + 1],
                    ]));
                    write_reference(store, packages, heap, &tag.child(index)?, element)?;
                }
            }

            heap.array_mut(reference)?.attach(*tag);
            Ok(())
        }
    }
}

fn write_instance<S>(
    store: &mut S,
    packages: &mut PackageTable,
    heap: &mut Heap,
    tag: &Tag,
    reference: Reference,
) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    let instance = heap.instance(reference)?;

    if let Some(src) = instance.backing().copied() {
        if src != *tag {
            copy_record(store, packages, &src, tag)?;
        }
        return Ok(());
    }

    let package = instance.package();
    let class_index = instance.class_index();
    let fields = instance.fields().to_vec();

    let [class_hi, class_lo] = class_index.to_be_bytes();
    store.write(tag, &[StoredKind::Instance as u8, package, class_hi, class_lo])?;

    let mut slot = 0u16;
    while (slot as usize) < fields.len() {
        let child = tag.child(slot)?;

        match fields[slot as usize] {
            FieldValue::Uninit => write_uninitialized(store, &child)?,
            FieldValue::Byte(v) => write_byte_record(store, &child, v)?,
            FieldValue::Short(v) => write_short_record(store, &child, v)?,
            FieldValue::IntHigh(high) => {
                let low = match fields.get(slot as usize + 1) {
                    Some(FieldValue::IntLow(low)) => *low,
                    _ => return Err(Exception::Security),
                };
                write_int_record(store, &child, ((high as i32) << 16) | (low as u16 as i32))?;
                slot += 1;
            }
            FieldValue::IntLow(_) => return Err(Exception::Security),
            FieldValue::Reference(r) => write_reference(store, packages, heap, &child, r)?,
        }

        slot += 1;
    }

    heap.instance_mut(reference)?.attach(*tag);
    Ok(())
}

/// Serialize the object behind `reference` under `tag`, recursively, and
/// flip it to store-backed. Null writes the uninitialized record.
pub fn write_reference<S>(
    store: &mut S,
    packages: &mut PackageTable,
    heap: &mut Heap,
    tag: &Tag,
    reference: Reference,
) -> Result<(), Exception>
where
    S: Store + ?Sized,
{
    debug!(?tag, ?reference, "serializing object");

    if reference.is_null() {
        write_uninitialized(store, tag)
    } else if reference.is_array() {
        write_array(store, packages, heap, tag, reference)
    } else {
        write_instance(store, packages, heap, tag, reference)
    }
}
