//! Branches, switches and the jump-subroutine opcodes.
//!
//! Every branch offset is signed and relative to the opcode of the branch
//! instruction itself. Narrow offsets are 8-bit, wide ones 16-bit. A
//! switch whose computed target lands inside the switch instruction's own
//! operand bytes faults as security.

use super::Interpreter;
use crate::error::Exception;
use crate::state::ExecuteState;
use crate::storage::Store;

impl<S> Interpreter<S>
where
    S: Store,
{
    fn fetch_branch_offset(&mut self, wide: bool) -> Result<i32, Exception> {
        if wide {
            Ok((self.fetch_short()? as i16) as i32)
        } else {
            Ok((self.fetch_byte()? as i8) as i32)
        }
    }

    pub(super) fn if_cond<F>(&mut self, wide: bool, pred: F) -> Result<(), Exception>
    where
        F: FnOnce(i16) -> bool,
    {
        let base = self.opcode_base()?;
        let delta = self.fetch_branch_offset(wide)?;
        let value = self.stack.pop_short()?;

        if pred(value) {
            self.branch_from(base, delta)?;
        }
        Ok(())
    }

    pub(super) fn if_scmp<F>(&mut self, wide: bool, pred: F) -> Result<(), Exception>
    where
        F: FnOnce(i16, i16) -> bool,
    {
        let base = self.opcode_base()?;
        let delta = self.fetch_branch_offset(wide)?;
        let value2 = self.stack.pop_short()?;
        let value1 = self.stack.pop_short()?;

        if pred(value1, value2) {
            self.branch_from(base, delta)?;
        }
        Ok(())
    }

    pub(super) fn if_acmp(&mut self, wide: bool, want_equal: bool) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let delta = self.fetch_branch_offset(wide)?;
        let value2 = self.stack.pop_reference()?;
        let value1 = self.stack.pop_reference()?;

        if (value1 == value2) == want_equal {
            self.branch_from(base, delta)?;
        }
        Ok(())
    }

    pub(super) fn if_null(&mut self, wide: bool, want_null: bool) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let delta = self.fetch_branch_offset(wide)?;
        let value = self.stack.pop_reference()?;

        if value.is_null() == want_null {
            self.branch_from(base, delta)?;
        }
        Ok(())
    }

    pub(super) fn goto_branch(&mut self, wide: bool) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let delta = self.fetch_branch_offset(wide)?;
        self.branch_from(base, delta)
    }

    /// `jsr`: record the address of the following instruction in the
    /// frame's saved-PC ring, push the ring index as the returnAddress
    /// operand, and branch.
    pub(super) fn jsr(&mut self) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let delta = (self.fetch_short()? as i16) as i32;

        let slot = self.stack.current_frame_mut()?.save_pc()?;
        self.stack.push_word(slot as i16)?;

        self.branch_from(base, delta)
    }

    /// `ret`: read the returnAddress ring index from the named local and
    /// restore the saved program counter.
    pub(super) fn ret(&mut self) -> Result<(), Exception> {
        let index = self.fetch_byte()?;
        let slot = self.stack.read_local(index)? as u8;

        let frame = self.stack.current_frame_mut()?;
        frame.pc = frame.restore_pc(slot)?;
        Ok(())
    }

    fn take_switch_branch(&mut self, base: u16, delta: i32, operand_end: u16) -> Result<(), Exception> {
        let target = base as i32 + delta;

        // a crafted offset must not land inside the switch's own bytes
        if target >= base as i32 && target < operand_end as i32 {
            return Err(Exception::Security);
        }

        self.branch_from(base, delta)
    }

    pub(super) fn stableswitch(&mut self) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let default = self.fetch_short()? as i16;
        let low = self.fetch_short()? as i16;
        let high = self.fetch_short()? as i16;

        if low > high {
            return Err(Exception::Runtime);
        }

        let cells = (high as i32 - low as i32 + 1) as u32;
        let table = base as u32 + 7;
        let end = table + cells * 2;
        if end > u16::MAX as u32 {
            return Err(Exception::Security);
        }

        let index = self.stack.pop_short()?;

        let delta = if index < low || index > high {
            default as i32
        } else {
            let cell = table as u16 + (index as i32 - low as i32) as u16 * 2;
            (self.code_short_at(cell)? as i16) as i32
        };

        self.take_switch_branch(base, delta, end as u16)
    }

    pub(super) fn itableswitch(&mut self) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let default = self.fetch_short()? as i16;
        let low = self.fetch_int()?;
        let high = self.fetch_int()?;

        if low > high {
            return Err(Exception::Runtime);
        }

        let cells = (high.wrapping_sub(low).wrapping_add(1)) as u32;
        let table = base as u32 + 11;
        let end = table
            .checked_add(cells.checked_mul(2).ok_or(Exception::Security)?)
            .ok_or(Exception::Security)?;
        if end > u16::MAX as u32 {
            return Err(Exception::Security);
        }

        let index = self.stack.pop_int()?;

        let delta = if index < low || index > high {
            default as i32
        } else {
            let cell = table as u16 + (index.wrapping_sub(low) as u32 as u16) * 2;
            (self.code_short_at(cell)? as i16) as i32
        };

        self.take_switch_branch(base, delta, end as u16)
    }

    pub(super) fn slookupswitch(&mut self) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let default = self.fetch_short()? as i16;
        let npairs = self.fetch_short()?;

        let pairs = base as u32 + 5;
        let end = pairs + npairs as u32 * 4;
        if end > u16::MAX as u32 {
            return Err(Exception::Security);
        }
        let (pairs, end) = (pairs as u16, end as u16);

        let key = self.stack.pop_short()?;

        // pairs are sorted by match value, ascending
        let mut delta = default as i32;
        for pair in 0..npairs {
            let at = pairs + pair * 4;
            let matched = self.code_short_at(at)? as i16;

            if matched == key {
                delta = (self.code_short_at(at + 2)? as i16) as i32;
                break;
            }
            if matched > key {
                break;
            }
        }

        self.take_switch_branch(base, delta, end)
    }

    pub(super) fn ilookupswitch(&mut self) -> Result<(), Exception> {
        let base = self.opcode_base()?;
        let default = self.fetch_short()? as i16;
        let npairs = self.fetch_short()?;

        let pairs = base as u32 + 5;
        let end = pairs + npairs as u32 * 6;
        if end > u16::MAX as u32 {
            return Err(Exception::Security);
        }
        let (pairs, end) = (pairs as u16, end as u16);

        let key = self.stack.pop_int()?;

        let mut delta = default as i32;
        for pair in 0..npairs {
            let at = pairs + pair * 6;
            let hi = self.code_short_at(at)?;
            let lo = self.code_short_at(at + 2)?;
            let matched = ((hi as i32) << 16) | lo as i32;

            if matched == key {
                delta = (self.code_short_at(at + 4)? as i16) as i32;
                break;
            }
            if matched > key {
                break;
            }
        }

        self.take_switch_branch(base, delta, end)
    }

    /// `athrow`: pop the exception object and hand it to the unwind flow;
    /// a null object raises null-pointer instead.
    pub(super) fn athrow(&mut self) -> Result<ExecuteState, Exception> {
        let object = self.stack.pop_reference()?;

        if object.is_null() {
            return Err(Exception::NullPointer);
        }

        Ok(ExecuteState::Throw(object))
    }
}
