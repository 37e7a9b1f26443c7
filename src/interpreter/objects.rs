//! Object creation and type-check opcodes.

use super::Interpreter;
use crate::error::Exception;
use crate::object::{ArrayKind, InstanceObject};
use crate::reference::Reference;
use crate::resolver::{self, ClassTarget};
use crate::storage::Store;

impl<S> Interpreter<S>
where
    S: Store,
{
    /// `new`: allocate an instance of the resolved class with every field
    /// slot uninitialized.
    pub(super) fn new_instance(&mut self) -> Result<(), Exception> {
        let cp_index = self.fetch_short()?;
        let from = self.context.current_package()?;

        let class = resolver::class_target(&mut self.packages, &self.storage, from, cp_index)?;
        if resolver::is_interface(&mut self.packages, &self.storage, class)? {
            return Err(Exception::Security);
        }

        let slots = resolver::instance_size(&mut self.packages, &self.storage, class)?;
        let instance = InstanceObject::new(
            self.context.applet(),
            class.package,
            class.class_index,
            slots,
        );

        let reference = self.heap.add_instance(instance)?;
        self.stack.push_reference(reference)
    }

    /// Type compatibility of a non-null object against the target encoded
    /// by the shared `atype`/pool-index operand pair: 0 targets the
    /// resolved class or interface, 10..13 a primitive array type, 14 an
    /// array of the resolved class.
    fn docheck(&mut self, object: Reference, atype: u8, cp_index: u16) -> Result<bool, Exception> {
        let from = self.context.current_package()?;

        if atype == 0 {
            let target = resolver::class_target(&mut self.packages, &self.storage, from, cp_index)?;

            if object.is_array() {
                // an array only casts to the root class
                self.heap.array(object)?;
                return resolver::assignable_to_root(&mut self.packages, &self.storage, target);
            }

            let source = {
                let instance = self.heap.instance(object)?;
                ClassTarget {
                    package: instance.package(),
                    class_index: instance.class_index(),
                }
            };

            return resolver::assignable(&mut self.packages, &self.storage, source, target);
        }

        let kind = ArrayKind::from_atype(atype).ok_or(Exception::Security)?;

        if object.is_instance() {
            self.heap.instance(object)?;
            return Ok(false);
        }

        let (object_kind, element_class) = {
            let array = self.heap.array(object)?;
            (array.kind(), array.element_class())
        };

        if object_kind != kind {
            return Ok(false);
        }

        match kind {
            ArrayKind::Reference => {
                let source =
                    resolver::class_target(&mut self.packages, &self.storage, from, element_class)?;
                let target =
                    resolver::class_target(&mut self.packages, &self.storage, from, cp_index)?;
                resolver::assignable(&mut self.packages, &self.storage, source, target)
            }
            _ => Ok(true),
        }
    }

    /// `checkcast`: null passes unchanged; an incompatible object raises
    /// class-cast.
    pub(super) fn checkcast(&mut self) -> Result<(), Exception> {
        let atype = self.fetch_byte()?;
        let cp_index = self.fetch_short()?;
        let object = self.stack.pop_reference()?;

        if !object.is_null() && !self.docheck(object, atype, cp_index)? {
            return Err(Exception::ClassCast);
        }

        self.stack.push_reference(object)
    }

    /// `instanceof`: pushes 1 for a compatible non-null object, 0
    /// otherwise; null yields 0.
    pub(super) fn instanceof(&mut self) -> Result<(), Exception> {
        let atype = self.fetch_byte()?;
        let cp_index = self.fetch_short()?;
        let object = self.stack.pop_reference()?;

        let result = if object.is_null() {
            false
        } else {
            self.docheck(object, atype, cp_index)?
        };

        self.stack.push_short(result as i16)
    }
}
