//! Class component views: class-info and interface-info records.

use super::{u16_at, u8_at, ClassRef};
use crate::consts::{ClassIndex, CLASS_FLAG_INTERFACE, OBJECT_CLASS_SENTINEL};
use crate::error::Exception;

const CLASS_INFO_FIXED: usize = 10;

/// An interface-info record inside the class component.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceInfo<'a> {
    infos: &'a [u8],
    at: usize,
}

impl<'a> InterfaceInfo<'a> {
    /// Flags nibble.
    pub fn flags(&self) -> Result<u8, Exception> {
        Ok(u8_at(self.infos, self.at)? >> 4)
    }

    /// Number of declared superinterfaces.
    pub fn super_count(&self) -> Result<u8, Exception> {
        Ok(u8_at(self.infos, self.at)? & 0x0f)
    }

    /// The `index`-th superinterface reference.
    pub fn super_interface(&self, index: u8) -> Result<ClassRef, Exception> {
        if index >= self.super_count()? {
            return Err(Exception::Security);
        }
        let raw = u16_at(self.infos, self.at + 1 + index as usize * 2)?;
        Ok(ClassRef::decode(raw))
    }
}

/// One implemented-interface record of a class: the interface and the
/// remap from its method tokens to class-local virtual method tokens.
#[derive(Debug, Clone, Copy)]
pub struct ImplementedInterface<'a> {
    infos: &'a [u8],
    at: usize,
}

impl<'a> ImplementedInterface<'a> {
    /// The implemented interface.
    pub fn interface(&self) -> Result<ClassRef, Exception> {
        Ok(ClassRef::decode(u16_at(self.infos, self.at)?))
    }

    /// Number of remap entries.
    pub fn count(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 2)
    }

    /// Remap interface method token `token` to a class-local virtual
    /// method token.
    pub fn remap(&self, token: u8) -> Result<u8, Exception> {
        if token >= self.count()? {
            return Err(Exception::Security);
        }
        u8_at(self.infos, self.at + 3 + token as usize)
    }

    fn size(&self) -> Result<usize, Exception> {
        Ok(3 + self.count()? as usize)
    }
}

/// A class-info record inside the class component.
#[derive(Debug, Clone, Copy)]
pub struct ClassInfo<'a> {
    infos: &'a [u8],
    at: usize,
}

impl<'a> ClassInfo<'a> {
    /// View the record at byte offset `class_index` of the class
    /// component's info area. The offset may also name an interface-info
    /// record, which is shorter than the fixed class-info prefix; field
    /// accessors bound-check individually.
    pub fn at(infos: &'a [u8], class_index: ClassIndex) -> Result<Self, Exception> {
        let at = class_index as usize;
        if at >= infos.len() {
            return Err(Exception::Security);
        }
        Ok(Self { infos, at })
    }

    /// The record's offset, i.e. its class index.
    pub fn class_index(&self) -> ClassIndex {
        self.at as ClassIndex
    }

    /// Flags nibble.
    pub fn flags(&self) -> Result<u8, Exception> {
        Ok(u8_at(self.infos, self.at)? >> 4)
    }

    /// Whether the record at this offset describes an interface rather
    /// than a class.
    pub fn is_interface(&self) -> Result<bool, Exception> {
        Ok(self.flags()? & CLASS_FLAG_INTERFACE != 0)
    }

    /// View this offset as an interface-info record instead.
    pub fn as_interface(&self) -> Result<InterfaceInfo<'a>, Exception> {
        if !self.is_interface()? {
            return Err(Exception::Security);
        }
        Ok(InterfaceInfo {
            infos: self.infos,
            at: self.at,
        })
    }

    /// Number of implemented-interface records.
    pub fn interface_count(&self) -> Result<u8, Exception> {
        Ok(u8_at(self.infos, self.at)? & 0x0f)
    }

    /// The superclass reference; `None` names the root `Object` class.
    pub fn super_class(&self) -> Result<Option<ClassRef>, Exception> {
        let raw = u16_at(self.infos, self.at + 1)?;
        if raw == OBJECT_CLASS_SENTINEL {
            return Ok(None);
        }
        Ok(Some(ClassRef::decode(raw)))
    }

    /// Declared instance size, in words, excluding superclasses.
    pub fn declared_instance_size(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 3)
    }

    /// Token of the first reference-typed instance field.
    pub fn first_reference_token(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 4)
    }

    /// Number of reference-typed instance fields.
    pub fn reference_count(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 5)
    }

    /// First token covered by the public virtual-method table.
    pub fn public_table_base(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 6)
    }

    /// Number of public virtual-method table entries.
    pub fn public_table_count(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 7)
    }

    /// First token covered by the package virtual-method table.
    pub fn package_table_base(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 8)
    }

    /// Number of package virtual-method table entries.
    pub fn package_table_count(&self) -> Result<u8, Exception> {
        u8_at(self.infos, self.at + 9)
    }

    /// Method-component offset at `slot` of the public virtual-method
    /// table.
    pub fn public_method_offset(&self, slot: u8) -> Result<u16, Exception> {
        if slot >= self.public_table_count()? {
            return Err(Exception::Security);
        }
        u16_at(self.infos, self.at + CLASS_INFO_FIXED + slot as usize * 2)
    }

    /// Method-component offset at `slot` of the package virtual-method
    /// table.
    pub fn package_method_offset(&self, slot: u8) -> Result<u16, Exception> {
        if slot >= self.package_table_count()? {
            return Err(Exception::Security);
        }
        let base = self.at + CLASS_INFO_FIXED + self.public_table_count()? as usize * 2;
        u16_at(self.infos, base + slot as usize * 2)
    }

    /// The `index`-th implemented-interface record.
    pub fn implemented_interface(&self, index: u8) -> Result<ImplementedInterface<'a>, Exception> {
        if index >= self.interface_count()? {
            return Err(Exception::Security);
        }

        let mut at = self.at
            + CLASS_INFO_FIXED
            + (self.public_table_count()? as usize + self.package_table_count()? as usize) * 2;

        for _ in 0..index {
            let record = ImplementedInterface {
                infos: self.infos,
                at,
            };
            at += record.size()?;
        }

        Ok(ImplementedInterface {
            infos: self.infos,
            at,
        })
    }
}
