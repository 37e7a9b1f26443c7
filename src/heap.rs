//! Per-context live-object registries.

use crate::consts::{AppletId, MAX_HEAP_OBJECTS};
use crate::error::Exception;
use crate::object::{ArrayObject, ClearEvent, InstanceObject};
use crate::reference::Reference;

/// The live-object registry of one execution context.
///
/// Two growable registries, indexed from one: the reference discriminator
/// bit selects which one a reference resolves into. Index 0 is reserved
/// for null. References handed out stay stable for the life of the
/// context; nothing is recycled.
#[derive(Debug, Default, Clone)]
pub struct Heap {
    owner: AppletId,
    arrays: Vec<ArrayObject>,
    instances: Vec<InstanceObject>,
}

impl Heap {
    /// Create an empty heap owned by `owner`.
    pub fn new(owner: AppletId) -> Self {
        Self {
            owner,
            arrays: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// The owning applet id; the firewall key of every access.
    pub const fn owner(&self) -> AppletId {
        self.owner
    }

    /// Register an array, returning its reference.
    pub fn add_array(&mut self, array: ArrayObject) -> Result<Reference, Exception> {
        if self.arrays.len() >= MAX_HEAP_OBJECTS {
            return Err(Exception::FullMemory);
        }

        self.arrays.push(array);
        Ok(Reference::array(self.arrays.len() as u16))
    }

    /// Register an instance, returning its reference.
    pub fn add_instance(&mut self, instance: InstanceObject) -> Result<Reference, Exception> {
        if self.instances.len() >= MAX_HEAP_OBJECTS {
            return Err(Exception::FullMemory);
        }

        self.instances.push(instance);
        Ok(Reference::instance(self.instances.len() as u16))
    }

    fn firewall(&self, object_owner: AppletId) -> Result<(), Exception> {
        if object_owner != self.owner {
            return Err(Exception::Security);
        }
        Ok(())
    }

    /// Resolve an array reference. Null faults first, then a wrong
    /// discriminator, then the firewall.
    pub fn array(&self, reference: Reference) -> Result<&ArrayObject, Exception> {
        if reference.is_null() {
            return Err(Exception::NullPointer);
        }
        if !reference.is_array() {
            return Err(Exception::Security);
        }

        let array = self
            .arrays
            .get(reference.index() as usize - 1)
            .ok_or(Exception::Security)?;
        self.firewall(array.owner())?;

        Ok(array)
    }

    /// Resolve an array reference mutably.
    pub fn array_mut(&mut self, reference: Reference) -> Result<&mut ArrayObject, Exception> {
        if reference.is_null() {
            return Err(Exception::NullPointer);
        }
        if !reference.is_array() {
            return Err(Exception::Security);
        }

        let owner = self.owner;
        let array = self
            .arrays
            .get_mut(reference.index() as usize - 1)
            .ok_or(Exception::Security)?;

        if array.owner() != owner {
            return Err(Exception::Security);
        }

        Ok(array)
    }

    /// Resolve an instance reference. Null faults first, then a wrong
    /// discriminator, then the firewall.
    pub fn instance(&self, reference: Reference) -> Result<&InstanceObject, Exception> {
        if reference.is_null() {
            return Err(Exception::NullPointer);
        }
        if !reference.is_instance() {
            return Err(Exception::Security);
        }

        let instance = self
            .instances
            .get(reference.index() as usize - 1)
            .ok_or(Exception::Security)?;
        self.firewall(instance.owner())?;

        Ok(instance)
    }

    /// Resolve an instance reference mutably.
    pub fn instance_mut(&mut self, reference: Reference) -> Result<&mut InstanceObject, Exception> {
        if reference.is_null() {
            return Err(Exception::NullPointer);
        }
        if !reference.is_instance() {
            return Err(Exception::Security);
        }

        let owner = self.owner;
        let instance = self
            .instances
            .get_mut(reference.index() as usize - 1)
            .ok_or(Exception::Security)?;

        if instance.owner() != owner {
            return Err(Exception::Security);
        }

        Ok(instance)
    }

    /// Wipe every transient array whose clear policy matches `event`.
    /// Primitive buffers are zeroed, reference buffers nulled; the arrays
    /// themselves are not re-created.
    pub fn clear_transient(&mut self, event: ClearEvent) {
        for array in &mut self.arrays {
            if array.is_transient() && array.clear_event() == event {
                array.wipe();
            }
        }
    }

    /// Number of live arrays.
    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ArrayKind;

    #[test]
    fn null_faults_before_kind_check() {
        let heap = Heap::new(1);
        assert_eq!(heap.array(Reference::NULL), Err(Exception::NullPointer));
        assert_eq!(heap.instance(Reference::NULL), Err(Exception::NullPointer));
    }

    #[test]
    fn wrong_discriminator_faults_as_security() {
        let mut heap = Heap::new(1);
        let r = heap
            .add_array(ArrayObject::primitive(1, ArrayKind::Byte, 1).unwrap())
            .unwrap();

        assert!(heap.array(r).is_ok());
        assert_eq!(
            heap.instance(Reference::instance(r.index())),
            Err(Exception::Security)
        );
    }

    #[test]
    fn cross_owner_access_faults_as_security() {
        let mut heap = Heap::new(1);
        let foreign = ArrayObject::primitive(2, ArrayKind::Byte, 1).unwrap();
        let r = heap.add_array(foreign).unwrap();

        assert_eq!(heap.array(r), Err(Exception::Security));
    }

    #[test]
    fn clear_transient_only_touches_matching_arrays() {
        let mut heap = Heap::new(1);

        let mut keep = ArrayObject::transient(1, ArrayKind::Byte, 0xffff, 1, ClearEvent::OnDeselect);
        keep.set_byte(0, 7).unwrap();
        let keep = heap.add_array(keep).unwrap();

        let mut wipe = ArrayObject::transient(1, ArrayKind::Byte, 0xffff, 1, ClearEvent::OnSelect);
        wipe.set_byte(0, 9).unwrap();
        let wipe = heap.add_array(wipe).unwrap();

        heap.clear_transient(ClearEvent::OnSelect);

        assert_eq!(heap.array(keep).unwrap().get_byte(0).unwrap(), 7);
        assert_eq!(heap.array(wipe).unwrap().get_byte(0).unwrap(), 0);
    }
}
