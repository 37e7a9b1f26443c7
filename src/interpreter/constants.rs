//! Constant-push opcodes.

use super::Interpreter;
use crate::error::Exception;
use crate::reference::Reference;
use crate::storage::Store;

impl<S> Interpreter<S>
where
    S: Store,
{
    pub(super) fn aconst_null(&mut self) -> Result<(), Exception> {
        self.stack.push_reference(Reference::NULL)
    }

    pub(super) fn sconst(&mut self, value: i16) -> Result<(), Exception> {
        self.stack.push_short(value)
    }

    pub(super) fn iconst(&mut self, value: i32) -> Result<(), Exception> {
        self.stack.push_int(value)
    }

    /// Push a sign-extended immediate byte as a short.
    pub(super) fn bspush(&mut self) -> Result<(), Exception> {
        let value = self.fetch_byte()? as i8;
        self.stack.push_short(value as i16)
    }

    /// Push an immediate short.
    pub(super) fn sspush(&mut self) -> Result<(), Exception> {
        let value = self.fetch_short()? as i16;
        self.stack.push_short(value)
    }

    /// Push a sign-extended immediate byte as an int.
    pub(super) fn bipush(&mut self) -> Result<(), Exception> {
        let value = self.fetch_byte()? as i8;
        self.stack.push_int(value as i32)
    }

    /// Push a sign-extended immediate short as an int.
    pub(super) fn sipush(&mut self) -> Result<(), Exception> {
        let value = self.fetch_short()? as i16;
        self.stack.push_int(value as i32)
    }

    /// Push an immediate int.
    pub(super) fn iipush(&mut self) -> Result<(), Exception> {
        let value = self.fetch_int()?;
        self.stack.push_int(value)
    }
}
