//! The fetch/decode/dispatch loop and the run entry point.

use tracing::{debug, trace};

use super::Interpreter;
use crate::consts::{AppletId, PackageId};
use crate::context::CallContext;
use crate::error::{Exception, VmError};
use crate::heap::Heap;
use crate::opcode::Opcode;
use crate::reference::Reference;
use crate::resolver::{self, ClassTarget, MethodTarget};
use crate::stack::Stack;
use crate::state::{ExecuteState, ReturnValue};
use crate::storage::Store;

fn ok(result: Result<(), Exception>) -> Result<ExecuteState, Exception> {
    result.map(|_| ExecuteState::Proceed)
}

impl<S> Interpreter<S>
where
    S: Store,
{
    /// Resolve and run one entry method to completion.
    ///
    /// A fresh context owned by `applet` is created with `package` as the
    /// starting executing package. A static entry resolves through the
    /// export component: `class` is the export class token and `method`
    /// the static-method token. A non-static entry resolves through the
    /// applet component: `class` selects the applet whose install method
    /// is invoked. The interpreter then runs until the frame stack
    /// empties, returning the typed result of the outermost return.
    pub fn run(
        &mut self,
        applet: AppletId,
        package: PackageId,
        class: u8,
        method: u8,
        is_static: bool,
    ) -> Result<ReturnValue, VmError> {
        self.context = CallContext::new(applet, package);
        self.heap = Heap::new(applet);
        self.stack = Stack::new();

        self.packages
            .ensure(&self.storage, package)
            .map_err(|_| VmError::PackageNotFound(package))?;

        let offset = {
            let image = self
                .packages
                .get(package)
                .map_err(|_| VmError::PackageNotFound(package))?;

            if is_static {
                image
                    .export()
                    .and_then(|export| export.class_export(class)?.static_method_offset(method))
                    .map_err(|_| VmError::InvalidEntryPoint)?
            } else {
                image
                    .applet()
                    .and_then(|applets| applets.applet(class))
                    .map(|entry| entry.install_method_offset)
                    .map_err(|_| VmError::InvalidEntryPoint)?
            }
        };

        debug!(applet, package, offset, is_static, "starting run");

        self.invoke_method(MethodTarget { package, offset }, false)
            .map_err(VmError::Uncaught)?;

        loop {
            match self.step() {
                Ok(ExecuteState::Proceed) => {}
                Ok(ExecuteState::Finished(value)) => return Ok(value),
                Ok(ExecuteState::Throw(object)) => self.unwind(Some(object), Exception::Runtime)?,
                Err(e) => self.unwind(None, e)?,
            }
        }
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self) -> Result<ExecuteState, Exception> {
        let byte = self.fetch_byte()?;
        let op = Opcode::try_from(byte)?;

        trace!(%op, "dispatch");
        self.instruction(op)
    }

    pub(super) fn fetch_byte(&mut self) -> Result<u8, Exception> {
        let pc = self.stack.current_frame()?.pc;
        let byte = self
            .packages
            .ensure(&self.storage, pc.package)?
            .method_component()?
            .region_byte(pc.offset)?;

        self.stack.current_frame_mut()?.pc.offset =
            pc.offset.checked_add(1).ok_or(Exception::Security)?;
        Ok(byte)
    }

    pub(super) fn fetch_short(&mut self) -> Result<u16, Exception> {
        let hi = self.fetch_byte()?;
        let lo = self.fetch_byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    pub(super) fn fetch_int(&mut self) -> Result<i32, Exception> {
        let hi = self.fetch_short()?;
        let lo = self.fetch_short()?;
        Ok(((hi as i32) << 16) | lo as i32)
    }

    /// Method-region offset of the opcode being executed; valid at
    /// handler entry, before operands are fetched.
    pub(super) fn opcode_base(&self) -> Result<u16, Exception> {
        let pc = self.stack.current_frame()?.pc;
        pc.offset.checked_sub(1).ok_or(Exception::Security)
    }

    /// Read a code short without advancing the program counter.
    pub(super) fn code_short_at(&mut self, offset: u16) -> Result<u16, Exception> {
        let package = self.stack.current_frame()?.pc.package;
        self.packages
            .ensure(&self.storage, package)?
            .method_component()?
            .region_short(offset)
    }

    /// Redirect the program counter to `base + delta`; branch offsets are
    /// relative to the opcode of the branch instruction.
    pub(super) fn branch_from(&mut self, base: u16, delta: i32) -> Result<(), Exception> {
        let target = base as i32 + delta;
        if target <= 0 || target > u16::MAX as i32 {
            return Err(Exception::Security);
        }

        self.stack.current_frame_mut()?.pc.offset = target as u16;
        Ok(())
    }

    /// Unwind after a raised exception: search the executing package's
    /// handler table frame by frame, popping frames (and executing
    /// packages) until a handler matches or the stack empties.
    pub(super) fn unwind(
        &mut self,
        thrown: Option<Reference>,
        kind: Exception,
    ) -> Result<(), VmError> {
        debug!(?thrown, %kind, "unwinding");

        loop {
            if self.stack.is_empty() {
                return Err(VmError::Uncaught(kind));
            }

            let pc = self
                .stack
                .current_frame()
                .map_err(|_| VmError::Uncaught(kind))?
                .pc;

            // the program counter sits past the faulting opcode; step back
            // one byte so the covering range is the instruction's own
            match self.find_handler(pc.package, pc.offset.saturating_sub(1), thrown) {
                Ok(Some(handler_offset)) => {
                    let frame = self
                        .stack
                        .current_frame_mut()
                        .map_err(|_| VmError::Uncaught(kind))?;
                    frame.pc.offset = handler_offset;

                    self.stack
                        .clear_operands()
                        .and_then(|_| {
                            self.stack
                                .push_reference(thrown.unwrap_or(Reference::NULL))
                        })
                        .map_err(|_| VmError::Uncaught(kind))?;

                    return Ok(());
                }
                Ok(None) => {
                    self.stack.pop_frame().map_err(|_| VmError::Uncaught(kind))?;
                    self.context
                        .pop_package()
                        .map_err(|_| VmError::Uncaught(kind))?;
                }
                Err(_) => return Err(VmError::Uncaught(kind)),
            }
        }
    }

    /// Find a handler covering `offset` in `package`'s handler table.
    /// Catch-all entries match anything; typed entries only match a
    /// thrown object whose class is assignable to the catch type.
    fn find_handler(
        &mut self,
        package: PackageId,
        offset: u16,
        thrown: Option<Reference>,
    ) -> Result<Option<u16>, Exception> {
        let count = self
            .packages
            .ensure(&self.storage, package)?
            .method_component()?
            .handler_count()?;

        for index in 0..count {
            let handler = self
                .packages
                .get(package)?
                .method_component()?
                .handler(index)?;

            if !handler.covers(offset) {
                continue;
            }

            if handler.catch_type_index == 0 {
                return Ok(Some(handler.handler_offset));
            }

            let Some(object) = thrown else { continue };

            let source = {
                let instance = self.heap.instance(object)?;
                ClassTarget {
                    package: instance.package(),
                    class_index: instance.class_index(),
                }
            };
            let catch = resolver::class_target(
                &mut self.packages,
                &self.storage,
                package,
                handler.catch_type_index,
            )?;

            if resolver::assignable(&mut self.packages, &self.storage, source, catch)? {
                return Ok(Some(handler.handler_offset));
            }
        }

        Ok(None)
    }

    fn instruction(&mut self, op: Opcode) -> Result<ExecuteState, Exception> {
        use Opcode::*;

        match op {
            Nop => Ok(ExecuteState::Proceed),

            // constants
            AconstNull => ok(self.aconst_null()),
            SconstM1 => ok(self.sconst(-1)),
            Sconst0 => ok(self.sconst(0)),
            Sconst1 => ok(self.sconst(1)),
            Sconst2 => ok(self.sconst(2)),
            Sconst3 => ok(self.sconst(3)),
            Sconst4 => ok(self.sconst(4)),
            Sconst5 => ok(self.sconst(5)),
            IconstM1 => ok(self.iconst(-1)),
            Iconst0 => ok(self.iconst(0)),
            Iconst1 => ok(self.iconst(1)),
            Iconst2 => ok(self.iconst(2)),
            Iconst3 => ok(self.iconst(3)),
            Iconst4 => ok(self.iconst(4)),
            Iconst5 => ok(self.iconst(5)),
            Bspush => ok(self.bspush()),
            Sspush => ok(self.sspush()),
            Bipush => ok(self.bipush()),
            Sipush => ok(self.sipush()),
            Iipush => ok(self.iipush()),

            // local loads
            Aload | Sload => ok(self.load_word_indexed()),
            Iload => ok(self.load_int_indexed()),
            Aload0 | Sload0 => ok(self.load_word(0)),
            Aload1 | Sload1 => ok(self.load_word(1)),
            Aload2 | Sload2 => ok(self.load_word(2)),
            Aload3 | Sload3 => ok(self.load_word(3)),
            Iload0 => ok(self.load_int(0)),
            Iload1 => ok(self.load_int(1)),
            Iload2 => ok(self.load_int(2)),
            Iload3 => ok(self.load_int(3)),

            // local stores
            Astore | Sstore => ok(self.store_word_indexed()),
            Istore => ok(self.store_int_indexed()),
            Astore0 | Sstore0 => ok(self.store_word(0)),
            Astore1 | Sstore1 => ok(self.store_word(1)),
            Astore2 | Sstore2 => ok(self.store_word(2)),
            Astore3 | Sstore3 => ok(self.store_word(3)),
            Istore0 => ok(self.store_int(0)),
            Istore1 => ok(self.store_int(1)),
            Istore2 => ok(self.store_int(2)),
            Istore3 => ok(self.store_int(3)),

            // arrays
            Aaload => ok(self.aaload()),
            Baload => ok(self.baload()),
            Saload => ok(self.saload()),
            Iaload => ok(self.iaload()),
            Aastore => ok(self.aastore()),
            Bastore => ok(self.bastore()),
            Sastore => ok(self.sastore()),
            Iastore => ok(self.iastore()),
            Newarray => ok(self.newarray()),
            Anewarray => ok(self.anewarray()),
            Arraylength => ok(self.arraylength()),

            // operand-stack shuffling
            Pop => ok(self.pop1()),
            Pop2 => ok(self.pop2()),
            Dup => ok(self.dup()),
            Dup2 => ok(self.dup2()),
            DupX => ok(self.dup_x()),
            SwapX => ok(self.swap_x()),

            // arithmetic
            Sadd => ok(self.sbinop(i16::wrapping_add)),
            Iadd => ok(self.ibinop(i32::wrapping_add)),
            Ssub => ok(self.sbinop(i16::wrapping_sub)),
            Isub => ok(self.ibinop(i32::wrapping_sub)),
            Smul => ok(self.sbinop(i16::wrapping_mul)),
            Imul => ok(self.ibinop(i32::wrapping_mul)),
            Sdiv => ok(self.sdiv()),
            Idiv => ok(self.idiv()),
            Srem => ok(self.srem()),
            Irem => ok(self.irem()),
            Sneg => ok(self.sneg()),
            Ineg => ok(self.ineg()),
            Sshl => ok(self.sshl()),
            Ishl => ok(self.ishl()),
            Sshr => ok(self.sshr()),
            Ishr => ok(self.ishr()),
            Sushr => ok(self.sushr()),
            Iushr => ok(self.iushr()),
            Sand => ok(self.sbinop(|a, b| a & b)),
            Iand => ok(self.ibinop(|a, b| a & b)),
            Sor => ok(self.sbinop(|a, b| a | b)),
            Ior => ok(self.ibinop(|a, b| a | b)),
            Sxor => ok(self.sbinop(|a, b| a ^ b)),
            Ixor => ok(self.ibinop(|a, b| a ^ b)),
            Sinc => ok(self.sinc(false)),
            SincW => ok(self.sinc(true)),
            Iinc => ok(self.iinc(false)),
            IincW => ok(self.iinc(true)),
            S2b => ok(self.s2b()),
            S2i => ok(self.s2i()),
            I2b => ok(self.i2b()),
            I2s => ok(self.i2s()),
            Icmp => ok(self.icmp()),

            // branches
            Ifeq => ok(self.if_cond(false, |v| v == 0)),
            Ifne => ok(self.if_cond(false, |v| v != 0)),
            Iflt => ok(self.if_cond(false, |v| v < 0)),
            Ifge => ok(self.if_cond(false, |v| v >= 0)),
            Ifgt => ok(self.if_cond(false, |v| v > 0)),
            Ifle => ok(self.if_cond(false, |v| v <= 0)),
            IfeqW => ok(self.if_cond(true, |v| v == 0)),
            IfneW => ok(self.if_cond(true, |v| v != 0)),
            IfltW => ok(self.if_cond(true, |v| v < 0)),
            IfgeW => ok(self.if_cond(true, |v| v >= 0)),
            IfgtW => ok(self.if_cond(true, |v| v > 0)),
            IfleW => ok(self.if_cond(true, |v| v <= 0)),
            Ifnull => ok(self.if_null(false, true)),
            Ifnonnull => ok(self.if_null(false, false)),
            IfnullW => ok(self.if_null(true, true)),
            IfnonnullW => ok(self.if_null(true, false)),
            IfAcmpeq => ok(self.if_acmp(false, true)),
            IfAcmpne => ok(self.if_acmp(false, false)),
            IfAcmpeqW => ok(self.if_acmp(true, true)),
            IfAcmpneW => ok(self.if_acmp(true, false)),
            IfScmpeq => ok(self.if_scmp(false, |a, b| a == b)),
            IfScmpne => ok(self.if_scmp(false, |a, b| a != b)),
            IfScmplt => ok(self.if_scmp(false, |a, b| a < b)),
            IfScmpge => ok(self.if_scmp(false, |a, b| a >= b)),
            IfScmpgt => ok(self.if_scmp(false, |a, b| a > b)),
            IfScmple => ok(self.if_scmp(false, |a, b| a <= b)),
            IfScmpeqW => ok(self.if_scmp(true, |a, b| a == b)),
            IfScmpneW => ok(self.if_scmp(true, |a, b| a != b)),
            IfScmpltW => ok(self.if_scmp(true, |a, b| a < b)),
            IfScmpgeW => ok(self.if_scmp(true, |a, b| a >= b)),
            IfScmpgtW => ok(self.if_scmp(true, |a, b| a > b)),
            IfScmpleW => ok(self.if_scmp(true, |a, b| a <= b)),
            Goto => ok(self.goto_branch(false)),
            GotoW => ok(self.goto_branch(true)),
            Jsr => ok(self.jsr()),
            Ret => ok(self.ret()),
            Stableswitch => ok(self.stableswitch()),
            Itableswitch => ok(self.itableswitch()),
            Slookupswitch => ok(self.slookupswitch()),
            Ilookupswitch => ok(self.ilookupswitch()),

            // fields
            GetstaticA | GetstaticB | GetstaticS | GetstaticI => ok(self.getstatic(op)),
            PutstaticA | PutstaticB | PutstaticS | PutstaticI => ok(self.putstatic(op)),
            GetfieldA | GetfieldB | GetfieldS | GetfieldI => ok(self.getfield(op)),
            GetfieldAW | GetfieldBW | GetfieldSW | GetfieldIW => ok(self.getfield(op)),
            GetfieldAThis | GetfieldBThis | GetfieldSThis | GetfieldIThis => ok(self.getfield(op)),
            PutfieldA | PutfieldB | PutfieldS | PutfieldI => ok(self.putfield(op)),
            PutfieldAW | PutfieldBW | PutfieldSW | PutfieldIW => ok(self.putfield(op)),
            PutfieldAThis | PutfieldBThis | PutfieldSThis | PutfieldIThis => ok(self.putfield(op)),

            // objects and types
            New => ok(self.new_instance()),
            Checkcast => ok(self.checkcast()),
            Instanceof => ok(self.instanceof()),

            // invocation and return
            Invokevirtual => ok(self.invokevirtual()),
            Invokespecial => ok(self.invokespecial()),
            Invokestatic => ok(self.invokestatic()),
            Invokeinterface => ok(self.invokeinterface()),
            Areturn => self.areturn(),
            Sreturn => self.sreturn(),
            Ireturn => self.ireturn(),
            Return => self.vreturn(),

            // exception
            Athrow => self.athrow(),

            // native calls
            Impdep1 => ok(self.impdep1()),
            Impdep2 => Err(Exception::NotYetImplemented),
        }
    }
}
