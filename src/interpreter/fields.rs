//! Instance and static field access opcodes.
//!
//! Each width family (`a`, `b`, `s`, `i`) comes in three instance forms —
//! narrow (one-byte pool index, explicit receiver), wide (`_w`, two-byte
//! index) and `_this` (receiver from local 0) — plus the two-byte static
//! forms. Store-backed instances route every access through their record
//! tag; static fields always live in the store.

use super::Interpreter;
use crate::cap::CpEntry;
use crate::error::Exception;
use crate::opcode::Opcode;
use crate::reference::Reference;
use crate::resolver;
use crate::storage::{self, Store, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Reference,
    Byte,
    Short,
    Int,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Narrow,
    Wide,
    This,
}

fn field_form(op: Opcode) -> Result<(Width, Form), Exception> {
    use Opcode::*;

    let width = match op {
        GetfieldA | GetfieldAW | GetfieldAThis | PutfieldA | PutfieldAW | PutfieldAThis
        | GetstaticA | PutstaticA => Width::Reference,
        GetfieldB | GetfieldBW | GetfieldBThis | PutfieldB | PutfieldBW | PutfieldBThis
        | GetstaticB | PutstaticB => Width::Byte,
        GetfieldS | GetfieldSW | GetfieldSThis | PutfieldS | PutfieldSW | PutfieldSThis
        | GetstaticS | PutstaticS => Width::Short,
        GetfieldI | GetfieldIW | GetfieldIThis | PutfieldI | PutfieldIW | PutfieldIThis
        | GetstaticI | PutstaticI => Width::Int,
        _ => return Err(Exception::Security),
    };

    let form = match op {
        GetfieldA | GetfieldB | GetfieldS | GetfieldI | PutfieldA | PutfieldB | PutfieldS
        | PutfieldI => Form::Narrow,
        GetfieldAW | GetfieldBW | GetfieldSW | GetfieldIW | PutfieldAW | PutfieldBW
        | PutfieldSW | PutfieldIW => Form::Wide,
        GetfieldAThis | GetfieldBThis | GetfieldSThis | GetfieldIThis | PutfieldAThis
        | PutfieldBThis | PutfieldSThis | PutfieldIThis => Form::This,
        _ => Form::Wide,
    };

    Ok((width, form))
}

impl<S> Interpreter<S>
where
    S: Store,
{
    fn instance_field_slot_of(&mut self, cp_index: u16) -> Result<u16, Exception> {
        let from = self.context.current_package()?;

        match resolver::cp_entry(&mut self.packages, &self.storage, from, cp_index)? {
            CpEntry::InstanceFieldRef { class, token } => {
                let class =
                    resolver::resolve_class_ref(&mut self.packages, &self.storage, from, class)?;
                resolver::instance_field_slot(&mut self.packages, &self.storage, class, token)
            }
            _ => Err(Exception::Security),
        }
    }

    fn fetch_field_operands(&mut self, form: Form) -> Result<(u16, Reference), Exception> {
        let cp_index = match form {
            Form::Wide => self.fetch_short()?,
            Form::Narrow | Form::This => self.fetch_byte()? as u16,
        };

        let receiver = match form {
            Form::This => Reference::from_word(self.stack.read_local(0)?),
            Form::Narrow | Form::Wide => self.stack.pop_reference()?,
        };

        Ok((cp_index, receiver))
    }

    pub(super) fn getfield(&mut self, op: Opcode) -> Result<(), Exception> {
        let (width, form) = field_form(op)?;
        let (cp_index, receiver) = self.fetch_field_operands(form)?;

        let slot = self.instance_field_slot_of(cp_index)?;
        let backing = self.heap.instance(receiver)?.backing().copied();

        match backing {
            Some(tag) => {
                let child = tag.child(slot)?;
                match width {
                    Width::Byte => {
                        let v = storage::read_byte_record(&self.storage, &child)?;
                        self.stack.push_byte(v)
                    }
                    Width::Short => {
                        let v = storage::read_short_record(&self.storage, &child)?;
                        self.stack.push_short(v)
                    }
                    Width::Int => {
                        let v = storage::read_int_record(&self.storage, &child)?;
                        self.stack.push_int(v)
                    }
                    Width::Reference => {
                        let v = storage::read_reference(
                            &self.storage,
                            &mut self.packages,
                            &mut self.heap,
                            &child,
                        )?;
                        self.stack.push_reference(v)
                    }
                }
            }
            None => match width {
                Width::Byte => {
                    let v = self.heap.instance(receiver)?.byte_at(slot)?;
                    self.stack.push_byte(v)
                }
                Width::Short => {
                    let v = self.heap.instance(receiver)?.short_at(slot)?;
                    self.stack.push_short(v)
                }
                Width::Int => {
                    let v = self.heap.instance(receiver)?.int_at(slot)?;
                    self.stack.push_int(v)
                }
                Width::Reference => {
                    let v = self.heap.instance(receiver)?.reference_at(slot)?;
                    self.stack.push_reference(v)
                }
            },
        }
    }

    pub(super) fn putfield(&mut self, op: Opcode) -> Result<(), Exception> {
        let (width, form) = field_form(op)?;

        let cp_index = match form {
            Form::Wide => self.fetch_short()?,
            Form::Narrow | Form::This => self.fetch_byte()? as u16,
        };

        // the value sits above the receiver
        enum Value {
            Byte(i8),
            Short(i16),
            Int(i32),
            Reference(Reference),
        }

        let value = match width {
            Width::Byte => Value::Byte(self.stack.pop_short()? as i8),
            Width::Short => Value::Short(self.stack.pop_short()?),
            Width::Int => Value::Int(self.stack.pop_int()?),
            Width::Reference => Value::Reference(self.stack.pop_reference()?),
        };

        let receiver = match form {
            Form::This => Reference::from_word(self.stack.read_local(0)?),
            Form::Narrow | Form::Wide => self.stack.pop_reference()?,
        };

        let slot = self.instance_field_slot_of(cp_index)?;
        let backing = self.heap.instance(receiver)?.backing().copied();

        match backing {
            Some(tag) => {
                let child = tag.child(slot)?;
                match value {
                    Value::Byte(v) => storage::write_byte_record(&mut self.storage, &child, v),
                    Value::Short(v) => storage::write_short_record(&mut self.storage, &child, v),
                    Value::Int(v) => storage::write_int_record(&mut self.storage, &child, v),
                    Value::Reference(v) => storage::write_reference(
                        &mut self.storage,
                        &mut self.packages,
                        &mut self.heap,
                        &child,
                        v,
                    ),
                }
            }
            None => {
                let instance = self.heap.instance_mut(receiver)?;
                match value {
                    Value::Byte(v) => instance.set_byte(slot, v),
                    Value::Short(v) => instance.set_short(slot, v),
                    Value::Int(v) => instance.set_int(slot, v),
                    Value::Reference(v) => instance.set_reference(slot, v),
                }
            }
        }
    }

    fn static_field_tag(&mut self, cp_index: u16) -> Result<Tag, Exception> {
        let from = self.context.current_package()?;

        let static_ref = match resolver::cp_entry(&mut self.packages, &self.storage, from, cp_index)?
        {
            CpEntry::StaticFieldRef(r) => r,
            _ => return Err(Exception::Security),
        };

        let target =
            resolver::static_field_target(&mut self.packages, &self.storage, from, static_ref)?;
        Ok(Tag::static_field(target.package, target.offset))
    }

    pub(super) fn getstatic(&mut self, op: Opcode) -> Result<(), Exception> {
        let (width, _) = field_form(op)?;
        let cp_index = self.fetch_short()?;
        let tag = self.static_field_tag(cp_index)?;

        match width {
            Width::Byte => {
                let v = storage::read_byte_record(&self.storage, &tag)?;
                self.stack.push_byte(v)
            }
            Width::Short => {
                let v = storage::read_short_record(&self.storage, &tag)?;
                self.stack.push_short(v)
            }
            Width::Int => {
                let v = storage::read_int_record(&self.storage, &tag)?;
                self.stack.push_int(v)
            }
            Width::Reference => {
                let v = storage::read_reference(
                    &self.storage,
                    &mut self.packages,
                    &mut self.heap,
                    &tag,
                )?;
                self.stack.push_reference(v)
            }
        }
    }

    pub(super) fn putstatic(&mut self, op: Opcode) -> Result<(), Exception> {
        let (width, _) = field_form(op)?;
        let cp_index = self.fetch_short()?;
        let tag = self.static_field_tag(cp_index)?;

        match width {
            Width::Byte => {
                let v = self.stack.pop_short()? as i8;
                storage::write_byte_record(&mut self.storage, &tag, v)
            }
            Width::Short => {
                let v = self.stack.pop_short()?;
                storage::write_short_record(&mut self.storage, &tag, v)
            }
            Width::Int => {
                let v = self.stack.pop_int()?;
                storage::write_int_record(&mut self.storage, &tag, v)
            }
            Width::Reference => {
                let v = self.stack.pop_reference()?;
                storage::write_reference(
                    &mut self.storage,
                    &mut self.packages,
                    &mut self.heap,
                    &tag,
                    v,
                )
            }
        }
    }
}
