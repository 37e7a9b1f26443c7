//! Array creation and element access opcodes.
//!
//! Every array opcode checks null first, then the element index against
//! the fixed length. Element reads and writes route by the array's
//! backing: volatile buffers are touched directly, store-backed arrays go
//! through the positional store interface, and reference elements of
//! store-backed arrays (de)serialize under per-element child tags.

use super::Interpreter;
use crate::error::Exception;
use crate::object::{ArrayKind, ArrayObject};
use crate::reference::Reference;
use crate::resolver;
use crate::storage::{self, Store, Tag};

impl<S> Interpreter<S>
where
    S: Store,
{
    /// `newarray`: create a primitive array of the `atype` operand.
    pub(super) fn newarray(&mut self) -> Result<(), Exception> {
        let atype = self.fetch_byte()?;
        let kind = ArrayKind::from_atype(atype).ok_or(Exception::Security)?;

        let count = self.stack.pop_short()?;
        if count < 0 {
            return Err(Exception::NegativeArraySize);
        }

        let array = ArrayObject::primitive(self.context.applet(), kind, count as u16)?;
        let reference = self.heap.add_array(array)?;
        self.stack.push_reference(reference)
    }

    /// `anewarray`: create a reference array whose element class is the
    /// constant-pool entry named by the operand.
    pub(super) fn anewarray(&mut self) -> Result<(), Exception> {
        let element_class = self.fetch_short()?;

        // must name a class reference
        let from = self.context.current_package()?;
        resolver::class_target(&mut self.packages, &self.storage, from, element_class)?;

        let count = self.stack.pop_short()?;
        if count < 0 {
            return Err(Exception::NegativeArraySize);
        }

        let array = ArrayObject::reference(self.context.applet(), element_class, count as u16);
        let reference = self.heap.add_array(array)?;
        self.stack.push_reference(reference)
    }

    pub(super) fn arraylength(&mut self) -> Result<(), Exception> {
        let reference = self.stack.pop_reference()?;
        let length = self.heap.array(reference)?.length();
        self.stack.push_short(length as i16)
    }

    fn pop_array_index(&mut self) -> Result<(u16, Reference), Exception> {
        let index = self.stack.pop_short()?;
        let reference = self.stack.pop_reference()?;

        if index < 0 {
            // the null check still comes first
            self.heap.array(reference)?;
            return Err(Exception::ArrayIndexOutOfBounds);
        }

        Ok((index as u16, reference))
    }

    /// Resolve the array, check the index, and return its persistent tag
    /// if it is store-backed.
    fn checked_backing(
        &self,
        reference: Reference,
        index: u16,
        kind: &[ArrayKind],
    ) -> Result<Option<Tag>, Exception> {
        let array = self.heap.array(reference)?;

        if !kind.contains(&array.kind()) {
            return Err(Exception::Security);
        }
        if index >= array.length() {
            return Err(Exception::ArrayIndexOutOfBounds);
        }

        Ok(array.stored_tag().copied())
    }

    pub(super) fn baload(&mut self) -> Result<(), Exception> {
        let (index, reference) = self.pop_array_index()?;
        let backing =
            self.checked_backing(reference, index, &[ArrayKind::Byte, ArrayKind::Boolean])?;

        let value = match backing {
            None => self.heap.array(reference)?.get_byte(index)?,
            Some(tag) => self.storage.read_1b_at(&tag, index)? as i8,
        };

        self.stack.push_byte(value)
    }

    pub(super) fn saload(&mut self) -> Result<(), Exception> {
        let (index, reference) = self.pop_array_index()?;
        let backing = self.checked_backing(reference, index, &[ArrayKind::Short])?;

        let value = match backing {
            None => self.heap.array(reference)?.get_short(index)?,
            Some(tag) => self.storage.read_2b_at(&tag, index)? as i16,
        };

        self.stack.push_short(value)
    }

    pub(super) fn iaload(&mut self) -> Result<(), Exception> {
        let (index, reference) = self.pop_array_index()?;
        let backing = self.checked_backing(reference, index, &[ArrayKind::Int])?;

        let value = match backing {
            None => self.heap.array(reference)?.get_int(index)?,
            Some(tag) => self.storage.read_4b_at(&tag, index)? as i32,
        };

        self.stack.push_int(value)
    }

    pub(super) fn aaload(&mut self) -> Result<(), Exception> {
        let (index, reference) = self.pop_array_index()?;
        let backing = self.checked_backing(reference, index, &[ArrayKind::Reference])?;

        let value = match backing {
            None => self.heap.array(reference)?.get_reference(index)?,
            Some(tag) => {
                let child = tag.child(index)?;
                storage::read_reference(&self.storage, &mut self.packages, &mut self.heap, &child)?
            }
        };

        self.stack.push_reference(value)
    }

    pub(super) fn bastore(&mut self) -> Result<(), Exception> {
        let value = self.stack.pop_short()? as i8;
        let (index, reference) = self.pop_array_index()?;
        let backing =
            self.checked_backing(reference, index, &[ArrayKind::Byte, ArrayKind::Boolean])?;

        match backing {
            None => self.heap.array_mut(reference)?.set_byte(index, value),
            Some(tag) => {
                self.storage.write_1b_at(&tag, index, value as u8)?;
                Ok(())
            }
        }
    }

    pub(super) fn sastore(&mut self) -> Result<(), Exception> {
        let value = self.stack.pop_short()?;
        let (index, reference) = self.pop_array_index()?;
        let backing = self.checked_backing(reference, index, &[ArrayKind::Short])?;

        match backing {
            None => self.heap.array_mut(reference)?.set_short(index, value),
            Some(tag) => {
                self.storage.write_2b_at(&tag, index, value as u16)?;
                Ok(())
            }
        }
    }

    pub(super) fn iastore(&mut self) -> Result<(), Exception> {
        let value = self.stack.pop_int()?;
        let (index, reference) = self.pop_array_index()?;
        let backing = self.checked_backing(reference, index, &[ArrayKind::Int])?;

        match backing {
            None => self.heap.array_mut(reference)?.set_int(index, value),
            Some(tag) => {
                self.storage.write_4b_at(&tag, index, value as u32)?;
                Ok(())
            }
        }
    }

    /// `aastore`: the source reference must be assignable to the array's
    /// declared element type, or the instruction faults as array-store.
    pub(super) fn aastore(&mut self) -> Result<(), Exception> {
        let value = self.stack.pop_reference()?;
        let (index, reference) = self.pop_array_index()?;
        let backing = self.checked_backing(reference, index, &[ArrayKind::Reference])?;
        let element_class = self.heap.array(reference)?.element_class();

        if !value.is_null() {
            let from = self.context.current_package()?;
            let target =
                resolver::class_target(&mut self.packages, &self.storage, from, element_class)?;

            let compatible = if value.is_array() {
                // an array is only assignable to the root class
                resolver::assignable_to_root(&mut self.packages, &self.storage, target)?
            } else {
                let source = {
                    let instance = self.heap.instance(value)?;
                    resolver::ClassTarget {
                        package: instance.package(),
                        class_index: instance.class_index(),
                    }
                };
                resolver::assignable(&mut self.packages, &self.storage, source, target)?
            };

            if !compatible {
                return Err(Exception::ArrayStore);
            }
        }

        match backing {
            None => self.heap.array_mut(reference)?.set_reference(index, value),
            Some(tag) => {
                let child = tag.child(index)?;
                storage::write_reference(
                    &mut self.storage,
                    &mut self.packages,
                    &mut self.heap,
                    &child,
                    value,
                )
            }
        }
    }
}
