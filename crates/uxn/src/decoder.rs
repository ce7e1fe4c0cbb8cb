use crate::opcode::Mode;
use crate::{Device, Fault, Machine};

/// Per-instruction view of the machine.
///
/// Pops go through `cursor`, a copy of the source stack pointer taken when
/// the instruction was fetched. In keep mode the cursor is never written
/// back, so every read in the instruction sees the same top of stack and
/// the depth is unchanged. Pushes always go to the stored pointer.
pub(crate) struct Decoder {
    mode: Mode,
    cursor: u8,
}

impl Decoder {
    pub fn new(machine: &Machine, instruction: u8) -> Self {
        let mode = Mode::from_instruction(instruction);
        let cursor = machine.stack(mode.ret).pointer();
        Self { mode, cursor }
    }

    pub fn short(&self) -> bool {
        self.mode.short
    }

    pub fn pop8(&mut self, machine: &mut Machine) -> Result<u8, Fault> {
        let (stack, ram) = machine.stack_and_ram(self.mode.ret);
        let (value, cursor) = stack.take8(ram, self.cursor)?;
        self.cursor = cursor;
        if !self.mode.keep {
            stack.set_pointer(cursor);
        }
        Ok(value)
    }

    pub fn pop16(&mut self, machine: &mut Machine) -> Result<u16, Fault> {
        let (stack, ram) = machine.stack_and_ram(self.mode.ret);
        let (value, cursor) = stack.take16(ram, self.cursor)?;
        self.cursor = cursor;
        if !self.mode.keep {
            stack.set_pointer(cursor);
        }
        Ok(value)
    }

    /// Pops one operand of the instruction's width.
    pub fn pop(&mut self, machine: &mut Machine) -> Result<u16, Fault> {
        if self.mode.short {
            self.pop16(machine)
        } else {
            self.pop8(machine).map(u16::from)
        }
    }

    pub fn push8(&self, machine: &mut Machine, value: u8) -> Result<(), Fault> {
        let (stack, ram) = machine.stack_and_ram(self.mode.ret);
        stack.push8(ram, value)
    }

    pub fn push16(&self, machine: &mut Machine, value: u16) -> Result<(), Fault> {
        let (stack, ram) = machine.stack_and_ram(self.mode.ret);
        stack.push16(ram, value)
    }

    /// Pushes one operand of the instruction's width, truncating in byte mode.
    pub fn push(&self, machine: &mut Machine, value: u16) -> Result<(), Fault> {
        push_width(machine, self.mode.ret, self.mode.short, value)
    }

    /// Pushes to the stack opposite the source.
    pub fn push_destination(&self, machine: &mut Machine, value: u16) -> Result<(), Fault> {
        push_width(machine, !self.mode.ret, self.mode.short, value)
    }

    pub fn push16_destination(&self, machine: &mut Machine, value: u16) -> Result<(), Fault> {
        let (stack, ram) = machine.stack_and_ram(!self.mode.ret);
        stack.push16(ram, value)
    }

    pub fn peek(&self, machine: &Machine, address: u16) -> u16 {
        if self.mode.short {
            machine.peek16(address)
        } else {
            u16::from(machine.peek8(address))
        }
    }

    pub fn poke(&self, machine: &mut Machine, address: u16, value: u16) {
        if self.mode.short {
            machine.poke16(address, value);
        } else {
            machine.poke8(address, low_byte(value));
        }
    }

    /// Absolute in short mode, otherwise a signed offset from `pc`.
    pub fn jump(&self, pc: u16, address: u16) -> u16 {
        if self.mode.short {
            address
        } else {
            pc.wrapping_add_signed(i16::from(low_byte(address) as i8))
        }
    }

    pub fn device_read<D: Device + ?Sized>(
        &self,
        machine: &mut Machine,
        device: &mut D,
        port: u8,
    ) -> u16 {
        let high = device.device_in(machine, port);
        if !self.mode.short {
            return u16::from(high);
        }
        let low = device.device_in(machine, port.wrapping_add(1));
        u16::from_be_bytes([high, low])
    }

    pub fn device_write<D: Device + ?Sized>(
        &self,
        machine: &mut Machine,
        device: &mut D,
        port: u8,
        value: u16,
    ) {
        if self.mode.short {
            let [high, low] = value.to_be_bytes();
            device.device_out(machine, port, high);
            device.device_out(machine, port.wrapping_add(1), low);
        } else {
            device.device_out(machine, port, low_byte(value));
        }
    }
}

fn push_width(machine: &mut Machine, ret: bool, short: bool, value: u16) -> Result<(), Fault> {
    let (stack, ram) = machine.stack_and_ram(ret);
    if short {
        stack.push16(ram, value)
    } else {
        stack.push8(ram, low_byte(value))
    }
}

fn low_byte(value: u16) -> u8 {
    let [_, low] = value.to_be_bytes();
    low
}
