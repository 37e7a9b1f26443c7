//! The four invoke forms and the return opcodes.
//!
//! Arguments are not popped by an invoke: they become the new frame's
//! first locals by the frame-push rule, the receiver (for non-static
//! forms) deepest. Every invoke pushes the resolved package onto the
//! context's executing-package stack; every return pops it and transfers
//! its typed result to the caller's operand stack.

use tracing::debug;

use super::Interpreter;
use crate::cap::CpEntry;
use crate::error::Exception;
use crate::reference::Reference;
use crate::resolver::{self, ClassTarget, MethodTarget};
use crate::stack::ProgramCounter;
use crate::state::{ExecuteState, ReturnValue};
use crate::storage::Store;

impl<S> Interpreter<S>
where
    S: Store,
{
    /// Push a frame for `target` and make its package the executing one.
    /// An abstract method faults as security. With `check_receiver`, the
    /// receiver (the deepest of the method's `nargs` argument words) must
    /// be non-null before the frame is created.
    pub(super) fn invoke_method(
        &mut self,
        target: MethodTarget,
        check_receiver: bool,
    ) -> Result<(), Exception> {
        let header = self
            .packages
            .ensure(&self.storage, target.package)?
            .method_component()?
            .method_header(target.offset)?;

        if header.is_abstract() {
            return Err(Exception::Security);
        }

        if check_receiver {
            let receiver = Reference::from_word(self.stack.peek_word(header.nargs as usize)?);
            if receiver.is_null() {
                return Err(Exception::NullPointer);
            }
        }

        debug!(
            package = target.package,
            offset = target.offset,
            nargs = header.nargs,
            "invoke"
        );

        self.stack.push_frame(
            header.nargs,
            header.max_locals,
            header.max_stack,
            ProgramCounter::new(target.package, header.body_offset),
        )?;
        self.context.push_package(target.package);

        Ok(())
    }

    fn receiver_class(&mut self, nargs: u8) -> Result<(Reference, ClassTarget), Exception> {
        let receiver = Reference::from_word(self.stack.peek_word(nargs as usize)?);
        if receiver.is_null() {
            return Err(Exception::NullPointer);
        }

        let instance = self.heap.instance(receiver)?;
        Ok((
            receiver,
            ClassTarget {
                package: instance.package(),
                class_index: instance.class_index(),
            },
        ))
    }

    fn method_nargs(&mut self, target: MethodTarget) -> Result<u8, Exception> {
        Ok(self
            .packages
            .ensure(&self.storage, target.package)?
            .method_component()?
            .method_header(target.offset)?
            .nargs)
    }

    pub(super) fn invokestatic(&mut self) -> Result<(), Exception> {
        let cp_index = self.fetch_short()?;
        let from = self.context.current_package()?;

        let static_ref = match resolver::cp_entry(&mut self.packages, &self.storage, from, cp_index)?
        {
            CpEntry::StaticMethodRef(r) => r,
            _ => return Err(Exception::Security),
        };

        let target =
            resolver::static_method_target(&mut self.packages, &self.storage, from, static_ref)?;
        self.invoke_method(target, false)
    }

    pub(super) fn invokevirtual(&mut self) -> Result<(), Exception> {
        let cp_index = self.fetch_short()?;
        let from = self.context.current_package()?;

        let (class_ref, token) =
            match resolver::cp_entry(&mut self.packages, &self.storage, from, cp_index)? {
                CpEntry::VirtualMethodRef { class, token } => (class, token),
                _ => return Err(Exception::Security),
            };

        // the statically named class fixes the signature, and with it the
        // receiver's depth on the operand stack
        let static_class =
            resolver::resolve_class_ref(&mut self.packages, &self.storage, from, class_ref)?;
        let declared =
            resolver::virtual_method_target(&mut self.packages, &self.storage, static_class, token)?;
        let nargs = self.method_nargs(declared)?;

        let (_, receiver_class) = self.receiver_class(nargs)?;
        let target = resolver::virtual_method_target(
            &mut self.packages,
            &self.storage,
            receiver_class,
            token,
        )?;

        self.invoke_method(target, true)
    }

    pub(super) fn invokespecial(&mut self) -> Result<(), Exception> {
        let cp_index = self.fetch_short()?;
        let from = self.context.current_package()?;

        match resolver::cp_entry(&mut self.packages, &self.storage, from, cp_index)? {
            CpEntry::StaticMethodRef(static_ref) => {
                let target = resolver::static_method_target(
                    &mut self.packages,
                    &self.storage,
                    from,
                    static_ref,
                )?;
                self.invoke_method(target, false)
            }
            CpEntry::SuperMethodRef { class, token } => {
                let class =
                    resolver::resolve_class_ref(&mut self.packages, &self.storage, from, class)?;
                let superclass = resolver::super_class(&mut self.packages, &self.storage, class)?
                    .ok_or(Exception::Security)?;
                let target = resolver::virtual_method_target(
                    &mut self.packages,
                    &self.storage,
                    superclass,
                    token,
                )?;
                self.invoke_method(target, true)
            }
            CpEntry::VirtualMethodRef { class, token } => {
                // the named class is dispatched without receiver lookup
                let class =
                    resolver::resolve_class_ref(&mut self.packages, &self.storage, from, class)?;
                let target =
                    resolver::virtual_method_target(&mut self.packages, &self.storage, class, token)?;
                self.invoke_method(target, true)
            }
            _ => Err(Exception::Security),
        }
    }

    pub(super) fn invokeinterface(&mut self) -> Result<(), Exception> {
        let cp_index = self.fetch_short()?;
        let nargs = self.fetch_byte()?;
        let token = self.fetch_byte()?;

        let from = self.context.current_package()?;
        let interface =
            resolver::class_target(&mut self.packages, &self.storage, from, cp_index)?;

        let (_, receiver_class) = self.receiver_class(nargs)?;
        let target = resolver::interface_method_target(
            &mut self.packages,
            &self.storage,
            receiver_class,
            interface,
            token,
        )?;

        self.invoke_method(target, false)
    }

    /// Destroy the current frame and transfer `value` to the caller's
    /// operand stack; when the outermost frame returns, the run finishes
    /// with the value instead.
    fn do_return(&mut self, value: ReturnValue) -> Result<ExecuteState, Exception> {
        self.stack.pop_frame()?;
        self.context.pop_package()?;

        debug!(?value, frames = self.stack.frame_count(), "return");

        if self.stack.is_empty() {
            return Ok(ExecuteState::Finished(value));
        }

        match value {
            ReturnValue::Void => {}
            ReturnValue::Short(v) => self.stack.push_short(v)?,
            ReturnValue::Int(v) => self.stack.push_int(v)?,
            ReturnValue::Reference(r) => self.stack.push_reference(r)?,
        }

        Ok(ExecuteState::Proceed)
    }

    pub(super) fn areturn(&mut self) -> Result<ExecuteState, Exception> {
        let value = self.stack.pop_reference()?;
        self.do_return(ReturnValue::Reference(value))
    }

    pub(super) fn sreturn(&mut self) -> Result<ExecuteState, Exception> {
        let value = self.stack.pop_short()?;
        self.do_return(ReturnValue::Short(value))
    }

    pub(super) fn ireturn(&mut self) -> Result<ExecuteState, Exception> {
        let value = self.stack.pop_int()?;
        self.do_return(ReturnValue::Int(value))
    }

    pub(super) fn vreturn(&mut self) -> Result<ExecuteState, Exception> {
        self.do_return(ReturnValue::Void)
    }
}
