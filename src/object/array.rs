//! Array objects: typed, fixed-length, volatile or store-backed.

use crate::consts::{AppletId, CpOffset, NO_ELEMENT_CLASS};
use crate::error::Exception;
use crate::object::StoredKind;
use crate::reference::Reference;
use crate::storage::Tag;

/// Element kind of an array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArrayKind {
    /// One byte per element, boolean interpretation.
    Boolean,
    /// One byte per element.
    Byte,
    /// Two bytes per element.
    Short,
    /// Four bytes per element.
    Int,
    /// Two bytes per element, compact reference.
    Reference,
}

impl ArrayKind {
    /// Element size in bytes.
    pub const fn entry_size(&self) -> usize {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Short | Self::Reference => 2,
            Self::Int => 4,
        }
    }

    /// Decode the `atype` operand byte shared by `newarray`, `checkcast`
    /// and `instanceof`.
    pub const fn from_atype(atype: u8) -> Option<Self> {
        match atype {
            10 => Some(Self::Boolean),
            11 => Some(Self::Byte),
            12 => Some(Self::Short),
            13 => Some(Self::Int),
            14 => Some(Self::Reference),
            _ => None,
        }
    }

    /// The field-type tag of this kind's serialized form.
    pub const fn stored_kind(&self, transient: bool) -> StoredKind {
        match (self, transient) {
            (Self::Byte, false) => StoredKind::ArrayByte,
            (Self::Boolean, false) => StoredKind::ArrayBoolean,
            (Self::Short, false) => StoredKind::ArrayShort,
            (Self::Int, false) => StoredKind::ArrayInt,
            (Self::Reference, false) => StoredKind::ArrayReference,
            (Self::Byte, true) => StoredKind::TransientArrayByte,
            (Self::Boolean, true) => StoredKind::TransientArrayBoolean,
            (Self::Short, true) => StoredKind::TransientArrayShort,
            (Self::Int, true) => StoredKind::TransientArrayInt,
            (Self::Reference, true) => StoredKind::TransientArrayReference,
        }
    }

    /// Recover the kind from a serialized field-type tag.
    pub const fn from_stored_kind(kind: StoredKind) -> Option<Self> {
        match kind {
            StoredKind::ArrayByte | StoredKind::TransientArrayByte => Some(Self::Byte),
            StoredKind::ArrayBoolean | StoredKind::TransientArrayBoolean => Some(Self::Boolean),
            StoredKind::ArrayShort | StoredKind::TransientArrayShort => Some(Self::Short),
            StoredKind::ArrayInt | StoredKind::TransientArrayInt => Some(Self::Int),
            StoredKind::ArrayReference | StoredKind::TransientArrayReference => {
                Some(Self::Reference)
            }
            _ => None,
        }
    }
}

/// Clear policy of a transient array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ClearEvent {
    /// Wiped when the owning applet is selected.
    OnSelect = 0x01,
    /// Wiped when the owning applet is deselected.
    OnDeselect = 0x02,
    /// Never wiped before teardown.
    None = 0xff,
}

impl TryFrom<u8> for ClearEvent {
    type Error = Exception;

    fn try_from(byte: u8) -> Result<Self, Exception> {
        match byte {
            0x01 => Ok(Self::OnSelect),
            0x02 => Ok(Self::OnDeselect),
            0xff => Ok(Self::None),
            _ => Err(Exception::Security),
        }
    }
}

/// Where an array's elements live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayBacking {
    /// In-memory element buffer, big-endian elements.
    Volatile(Vec<u8>),
    /// Elements live in the persistent store under this record tag.
    Stored(Tag),
}

/// A typed, fixed-length array object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayObject {
    owner: AppletId,
    kind: ArrayKind,
    element_class: CpOffset,
    length: u16,
    transient: bool,
    clear: ClearEvent,
    backing: ArrayBacking,
}

impl ArrayObject {
    /// Create a zero-filled in-memory primitive array.
    pub fn primitive(owner: AppletId, kind: ArrayKind, length: u16) -> Result<Self, Exception> {
        if matches!(kind, ArrayKind::Reference) {
            return Err(Exception::Security);
        }

        Ok(Self::volatile(owner, kind, NO_ELEMENT_CLASS, length))
    }

    /// Create a null-filled in-memory reference array with the declared
    /// element class.
    pub fn reference(owner: AppletId, element_class: CpOffset, length: u16) -> Self {
        Self::volatile(owner, ArrayKind::Reference, element_class, length)
    }

    fn volatile(owner: AppletId, kind: ArrayKind, element_class: CpOffset, length: u16) -> Self {
        Self {
            owner,
            kind,
            element_class,
            length,
            transient: false,
            clear: ClearEvent::None,
            backing: ArrayBacking::Volatile(vec![0; length as usize * kind.entry_size()]),
        }
    }

    /// Create a transient array; it lives only in memory and is wiped when
    /// its clear event fires.
    pub fn transient(
        owner: AppletId,
        kind: ArrayKind,
        element_class: CpOffset,
        length: u16,
        clear: ClearEvent,
    ) -> Self {
        Self {
            transient: true,
            clear,
            ..Self::volatile(owner, kind, element_class, length)
        }
    }

    /// Materialize a persistent array whose elements live in the store
    /// under `tag`.
    pub fn stored(
        owner: AppletId,
        kind: ArrayKind,
        element_class: CpOffset,
        length: u16,
        tag: Tag,
    ) -> Self {
        Self {
            owner,
            kind,
            element_class,
            length,
            transient: false,
            clear: ClearEvent::None,
            backing: ArrayBacking::Stored(tag),
        }
    }

    /// The owning applet id.
    pub const fn owner(&self) -> AppletId {
        self.owner
    }

    /// Element kind.
    pub const fn kind(&self) -> ArrayKind {
        self.kind
    }

    /// Declared element class, as a constant-pool offset; meaningless for
    /// primitive kinds.
    pub const fn element_class(&self) -> CpOffset {
        self.element_class
    }

    /// Number of elements; fixed at creation.
    pub const fn length(&self) -> u16 {
        self.length
    }

    /// Whether the array is transient.
    pub const fn is_transient(&self) -> bool {
        self.transient
    }

    /// The transient clear policy.
    pub const fn clear_event(&self) -> ClearEvent {
        self.clear
    }

    /// The element backing.
    pub const fn backing(&self) -> &ArrayBacking {
        &self.backing
    }

    /// The persistent record tag, when store-backed.
    pub const fn stored_tag(&self) -> Option<&Tag> {
        match &self.backing {
            ArrayBacking::Stored(tag) => Some(tag),
            ArrayBacking::Volatile(_) => None,
        }
    }

    /// Flip the backing to the persistent store under `tag`. Called once
    /// the array has been serialized there.
    pub fn attach(&mut self, tag: Tag) {
        if !self.transient {
            self.backing = ArrayBacking::Stored(tag);
        }
    }

    /// The in-memory element buffer, when volatile.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.backing {
            ArrayBacking::Volatile(buffer) => Some(buffer),
            ArrayBacking::Stored(_) => None,
        }
    }

    fn slot(&self, index: u16, expected: &[ArrayKind]) -> Result<usize, Exception> {
        if !expected.contains(&self.kind) {
            return Err(Exception::Security);
        }

        if index >= self.length {
            return Err(Exception::ArrayIndexOutOfBounds);
        }

        Ok(index as usize * self.kind.entry_size())
    }

    fn buffer(&self) -> Result<&[u8], Exception> {
        self.data().ok_or(Exception::Security)
    }

    fn buffer_mut(&mut self) -> Result<&mut Vec<u8>, Exception> {
        match &mut self.backing {
            ArrayBacking::Volatile(buffer) => Ok(buffer),
            ArrayBacking::Stored(_) => Err(Exception::Security),
        }
    }

    /// Fetch a byte or boolean element from a volatile buffer.
    pub fn get_byte(&self, index: u16) -> Result<i8, Exception> {
        let at = self.slot(index, &[ArrayKind::Byte, ArrayKind::Boolean])?;
        Ok(self.buffer()?[at] as i8)
    }

    /// Fetch a short element from a volatile buffer.
    pub fn get_short(&self, index: u16) -> Result<i16, Exception> {
        let at = self.slot(index, &[ArrayKind::Short])?;
        let buffer = self.buffer()?;
        Ok(i16::from_be_bytes([buffer[at], buffer[at + 1]]))
    }

    /// Fetch an int element from a volatile buffer.
    pub fn get_int(&self, index: u16) -> Result<i32, Exception> {
        let at = self.slot(index, &[ArrayKind::Int])?;
        let buffer = self.buffer()?;
        Ok(i32::from_be_bytes([
            buffer[at],
            buffer[at + 1],
            buffer[at + 2],
            buffer[at + 3],
        ]))
    }

    /// Fetch a reference element from a volatile buffer.
    pub fn get_reference(&self, index: u16) -> Result<Reference, Exception> {
        let at = self.slot(index, &[ArrayKind::Reference])?;
        let buffer = self.buffer()?;
        Ok(Reference::from_compact(u16::from_be_bytes([
            buffer[at],
            buffer[at + 1],
        ])))
    }

    /// Write a byte or boolean element into a volatile buffer.
    pub fn set_byte(&mut self, index: u16, value: i8) -> Result<(), Exception> {
        let at = self.slot(index, &[ArrayKind::Byte, ArrayKind::Boolean])?;
        self.buffer_mut()?[at] = value as u8;
        Ok(())
    }

    /// Write a short element into a volatile buffer.
    pub fn set_short(&mut self, index: u16, value: i16) -> Result<(), Exception> {
        let at = self.slot(index, &[ArrayKind::Short])?;
        self.buffer_mut()?[at..at + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Write an int element into a volatile buffer.
    pub fn set_int(&mut self, index: u16, value: i32) -> Result<(), Exception> {
        let at = self.slot(index, &[ArrayKind::Int])?;
        self.buffer_mut()?[at..at + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Write a reference element into a volatile buffer.
    pub fn set_reference(&mut self, index: u16, value: Reference) -> Result<(), Exception> {
        let at = self.slot(index, &[ArrayKind::Reference])?;
        self.buffer_mut()?[at..at + 2].copy_from_slice(&value.compact().to_be_bytes());
        Ok(())
    }

    /// Wipe the element buffer: zeroed for primitive kinds, nulled for
    /// reference arrays.
    pub fn wipe(&mut self) {
        if let ArrayBacking::Volatile(buffer) = &mut self.backing {
            buffer.fill(0);
        }
    }
}
