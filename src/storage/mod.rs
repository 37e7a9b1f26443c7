//! Persistent store abstraction, key composition and object serialization.

use std::fmt;
use std::io;

use crate::consts::{AppletId, ClassIndex, PackageId, MAX_PACKAGES, TAG_MAX_LEN};
use crate::error::Exception;
use crate::object::StoredKind;

mod memory;
mod serialize;

pub use memory::MemoryStorage;
pub use serialize::{
    read_byte_record, read_int_record, read_reference, read_short_record, write_byte_record,
    write_int_record, write_reference, write_short_record, write_uninitialized,
};

const PACKAGES_LIST_PREFIX: u8 = 0x50;
const CAP_PREFIX: u8 = 0x43;
const STATIC_PREFIX: u8 = 0x53;
const APPLET_FIELD_PREFIX: u8 = 0x41;

/// A short byte-string key into the persistent store.
///
/// Tags are composed by fixed schemas; an array-element tag is formed by
/// appending the 2-byte big-endian element index to the base array tag.
/// Composition past [`TAG_MAX_LEN`] faults as security.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    len: u8,
    bytes: [u8; TAG_MAX_LEN],
}

impl Tag {
    fn compose(parts: &[u8]) -> Self {
        debug_assert!(parts.len() <= TAG_MAX_LEN);

        let mut bytes = [0u8; TAG_MAX_LEN];
        bytes[..parts.len()].copy_from_slice(parts);

        Self {
            len: parts.len() as u8,
            bytes,
        }
    }

    /// The packages-list bitmap key.
    pub fn packages_list() -> Self {
        Self::compose(&[PACKAGES_LIST_PREFIX])
    }

    /// The package-image key of `package`.
    pub fn cap(package: PackageId) -> Self {
        Self::compose(&[CAP_PREFIX, package])
    }

    /// The key of one static field record, addressed by its offset into
    /// the static-field image.
    pub fn static_field(package: PackageId, static_id: u16) -> Self {
        let [hi, lo] = static_id.to_be_bytes();
        Self::compose(&[STATIC_PREFIX, package, hi, lo])
    }

    /// The key of one persistent instance field of an applet-owned object.
    pub fn applet_field(applet: AppletId, package: PackageId, class: ClassIndex, field: u8) -> Self {
        let [hi, lo] = class.to_be_bytes();
        Self::compose(&[APPLET_FIELD_PREFIX, applet, package, hi, lo, field])
    }

    /// Derive the child key of element `index`, appending the index
    /// big-endian.
    pub fn child(&self, index: u16) -> Result<Self, Exception> {
        let len = self.len as usize;
        if len + 2 > TAG_MAX_LEN {
            return Err(Exception::Security);
        }

        let mut child = *self;
        let [hi, lo] = index.to_be_bytes();
        child.bytes[len] = hi;
        child.bytes[len + 1] = lo;
        child.len = self.len + 2;

        Ok(child)
    }

    /// The key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(")?;
        for b in self.as_bytes() {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

fn record_not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no record under tag")
}

fn element_offset(record: &[u8], index: u16, width: usize) -> io::Result<usize> {
    let first = *record.first().ok_or_else(record_not_found)?;
    let kind =
        StoredKind::try_from(first).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if kind.is_transient() {
        // Transient element bodies are not persisted.
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "positional access on a transient record",
        ));
    }

    let offset = kind.header_len() + index as usize * width;
    if offset + width > record.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "positional access past record end",
        ));
    }

    Ok(offset)
}

/// The tag→bytes key-value interface backing persistent objects.
///
/// Records are written whole, atomically at tag granularity; the
/// positional variants address element `index` of a record laid out in the
/// serialized object format, skipping the record header. Ordering is
/// read-your-writes on the same tag.
pub trait Store {
    /// Length in bytes of the record under `tag`.
    fn length(&self, tag: &Tag) -> io::Result<u32>;

    /// Borrow the record under `tag`. The borrow must not be retained past
    /// the next mutating call with an overlapping tag.
    fn read_in_place(&self, tag: &Tag) -> io::Result<&[u8]>;

    /// Copy the record under `tag` into `dst`, returning the copied
    /// length.
    fn read(&self, tag: &Tag, dst: &mut [u8]) -> io::Result<usize>;

    /// Overwrite the whole record under `tag`.
    fn write(&mut self, tag: &Tag, src: &[u8]) -> io::Result<()>;

    /// Whether a record exists under `tag`.
    fn contains(&self, tag: &Tag) -> bool {
        self.length(tag).is_ok()
    }

    /// Read the 1-byte element `index` of the record under `tag`.
    fn read_1b_at(&self, tag: &Tag, index: u16) -> io::Result<u8> {
        let record = self.read_in_place(tag)?;
        let at = element_offset(record, index, 1)?;
        Ok(record[at])
    }

    /// Read the 2-byte element `index` of the record under `tag`.
    fn read_2b_at(&self, tag: &Tag, index: u16) -> io::Result<u16> {
        let record = self.read_in_place(tag)?;
        let at = element_offset(record, index, 2)?;
        Ok(u16::from_be_bytes([record[at], record[at + 1]]))
    }

    /// Read the 4-byte element `index` of the record under `tag`.
    fn read_4b_at(&self, tag: &Tag, index: u16) -> io::Result<u32> {
        let record = self.read_in_place(tag)?;
        let at = element_offset(record, index, 4)?;
        Ok(u32::from_be_bytes([
            record[at],
            record[at + 1],
            record[at + 2],
            record[at + 3],
        ]))
    }

    /// Overwrite the 1-byte element `index` of the record under `tag`.
    fn write_1b_at(&mut self, tag: &Tag, index: u16, value: u8) -> io::Result<()> {
        let mut record = self.read_in_place(tag)?.to_vec();
        let at = element_offset(&record, index, 1)?;
        record[at] = value;
        self.write(tag, &record)
    }

    /// Overwrite the 2-byte element `index` of the record under `tag`.
    fn write_2b_at(&mut self, tag: &Tag, index: u16, value: u16) -> io::Result<()> {
        let mut record = self.read_in_place(tag)?.to_vec();
        let at = element_offset(&record, index, 2)?;
        record[at..at + 2].copy_from_slice(&value.to_be_bytes());
        self.write(tag, &record)
    }

    /// Overwrite the 4-byte element `index` of the record under `tag`.
    fn write_4b_at(&mut self, tag: &Tag, index: u16, value: u32) -> io::Result<()> {
        let mut record = self.read_in_place(tag)?.to_vec();
        let at = element_offset(&record, index, 4)?;
        record[at..at + 4].copy_from_slice(&value.to_be_bytes());
        self.write(tag, &record)
    }
}

/// Whether the packages-list bitmap marks `package` as populated.
pub fn package_present<S: Store + ?Sized>(store: &S, package: PackageId) -> bool {
    let tag = Tag::packages_list();
    let mut bitmap = [0u8; MAX_PACKAGES / 8];

    match store.read(&tag, &mut bitmap) {
        Ok(_) => {}
        Err(_) => return false,
    }

    let slot = package as usize;
    slot < MAX_PACKAGES && bitmap[slot / 8] & (1 << (slot % 8)) != 0
}

/// Mark `package` as populated in the packages-list bitmap.
pub fn mark_package_present<S: Store + ?Sized>(store: &mut S, package: PackageId) -> io::Result<()> {
    let tag = Tag::packages_list();
    let mut bitmap = [0u8; MAX_PACKAGES / 8];
    let _ = store.read(&tag, &mut bitmap);

    let slot = package as usize;
    if slot >= MAX_PACKAGES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "package slot out of range",
        ));
    }

    bitmap[slot / 8] |= 1 << (slot % 8);
    store.write(&tag, &bitmap)
}
