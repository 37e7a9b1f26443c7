//! Instance objects: ordered typed field slots.

use crate::consts::{AppletId, ClassIndex, PackageId};
use crate::error::Exception;
use crate::object::FieldValue;
use crate::reference::Reference;
use crate::storage::Tag;

/// A class instance: owning package, class index and one word-sized typed
/// slot per instance field of the class and its superclasses.
///
/// A store-backed instance reads and writes only through its record tag;
/// the in-memory slots of such an instance are a dead shadow and must not
/// be touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceObject {
    owner: AppletId,
    package: PackageId,
    class_index: ClassIndex,
    fields: Vec<FieldValue>,
    backing: Option<Tag>,
}

impl InstanceObject {
    /// Allocate an in-memory instance with `slots` uninitialized field
    /// slots.
    pub fn new(owner: AppletId, package: PackageId, class_index: ClassIndex, slots: u16) -> Self {
        Self {
            owner,
            package,
            class_index,
            fields: vec![FieldValue::Uninit; slots as usize],
            backing: None,
        }
    }

    /// Materialize a store-backed instance whose fields live under child
    /// tags of `tag`.
    pub fn stored(
        owner: AppletId,
        package: PackageId,
        class_index: ClassIndex,
        slots: u16,
        tag: Tag,
    ) -> Self {
        Self {
            backing: Some(tag),
            ..Self::new(owner, package, class_index, slots)
        }
    }

    /// The owning applet id.
    pub const fn owner(&self) -> AppletId {
        self.owner
    }

    /// The package declaring the instantiated class.
    pub const fn package(&self) -> PackageId {
        self.package
    }

    /// The class-info offset of the instantiated class inside its
    /// package's class component.
    pub const fn class_index(&self) -> ClassIndex {
        self.class_index
    }

    /// Number of field slots.
    pub fn slot_count(&self) -> u16 {
        self.fields.len() as u16
    }

    /// The field slots.
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// The persistent record tag, when store-backed.
    pub const fn backing(&self) -> Option<&Tag> {
        self.backing.as_ref()
    }

    /// Flip the instance to store-backed under `tag`. Called once it has
    /// been serialized there.
    pub fn attach(&mut self, tag: Tag) {
        self.backing = Some(tag);
    }

    fn slot(&self, index: u16) -> Result<FieldValue, Exception> {
        self.fields
            .get(index as usize)
            .copied()
            .ok_or(Exception::Security)
    }

    fn slot_mut(&mut self, index: u16) -> Result<&mut FieldValue, Exception> {
        self.fields
            .get_mut(index as usize)
            .ok_or(Exception::Security)
    }

    /// Fetch a byte or boolean field.
    pub fn byte_at(&self, index: u16) -> Result<i8, Exception> {
        match self.slot(index)? {
            FieldValue::Uninit => Ok(0),
            FieldValue::Byte(v) => Ok(v),
            _ => Err(Exception::Security),
        }
    }

    /// Fetch a short field.
    pub fn short_at(&self, index: u16) -> Result<i16, Exception> {
        match self.slot(index)? {
            FieldValue::Uninit => Ok(0),
            FieldValue::Short(v) => Ok(v),
            _ => Err(Exception::Security),
        }
    }

    /// Fetch an int field spanning `index` and `index + 1`.
    pub fn int_at(&self, index: u16) -> Result<i32, Exception> {
        let high = self.slot(index)?;
        let low = self.slot(index + 1)?;

        match (high, low) {
            (FieldValue::Uninit, FieldValue::Uninit) => Ok(0),
            (FieldValue::IntHigh(h), FieldValue::IntLow(l)) => {
                Ok(((h as i32) << 16) | (l as u16 as i32))
            }
            _ => Err(Exception::Security),
        }
    }

    /// Fetch a reference field.
    pub fn reference_at(&self, index: u16) -> Result<Reference, Exception> {
        match self.slot(index)? {
            FieldValue::Uninit => Ok(Reference::NULL),
            FieldValue::Reference(r) => Ok(r),
            _ => Err(Exception::Security),
        }
    }

    /// Store a byte or boolean field.
    pub fn set_byte(&mut self, index: u16, value: i8) -> Result<(), Exception> {
        *self.slot_mut(index)? = FieldValue::Byte(value);
        Ok(())
    }

    /// Store a short field.
    pub fn set_short(&mut self, index: u16, value: i16) -> Result<(), Exception> {
        *self.slot_mut(index)? = FieldValue::Short(value);
        Ok(())
    }

    /// Store an int field spanning `index` and `index + 1`.
    pub fn set_int(&mut self, index: u16, value: i32) -> Result<(), Exception> {
        *self.slot_mut(index)? = FieldValue::IntHigh((value >> 16) as i16);
        *self.slot_mut(index + 1)? = FieldValue::IntLow(value as i16);
        Ok(())
    }

    /// Store a reference field.
    pub fn set_reference(&mut self, index: u16, value: Reference) -> Result<(), Exception> {
        *self.slot_mut(index)? = FieldValue::Reference(value);
        Ok(())
    }
}
