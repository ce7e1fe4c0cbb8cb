#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use thiserror_no_std::Error;

use crate::decoder::Decoder;
use crate::opcode::Op;

mod decoder;
pub mod opcode;
mod stack;

pub use opcode::{find, Mode};
pub use stack::{Stack, STACK_SIZE};


/// This module implements the uxn virtual machine.
///
/// All state lives in one byte buffer of sixteen 64 KiB pages. Programs
/// run from the first page, starting at `PAGE_PROGRAM`. The last page holds
/// the working stack, the return stack and a 256 byte device window:
///
/// `
///     0x00000 ..= 0x0ffff  program and data
///     0xf0000 ..= 0xf00ff  working stack
///     0xf0100 ..= 0xf01ff  return stack
///     0xf0200 ..= 0xf02ff  device window
/// `
///
/// Addresses seen by programs are 16 bits and wrap within the first page.
/// Device traffic is delegated to a host `Device`; the machine only keeps
/// the window so hosts have somewhere to store port state.
pub const RAM_PAGE_SIZE: usize = 0x10000;
pub const RAM_PAGES: usize = 0x10;
pub const RAM_SIZE: usize = RAM_PAGE_SIZE * RAM_PAGES;
pub const WORKING_STACK_OFFSET: usize = 0xf0000;
pub const RETURN_STACK_OFFSET: usize = 0xf0100;
pub const DEVICE_OFFSET: usize = 0xf0200;
pub const PAGE_PROGRAM: u16 = 0x0100;
/// Device byte that must be non-zero for the machine to run.
pub const ENABLE_PORT: u8 = 0x0f;

#[repr(u8)]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("stack underflow")]
    Underflow = 1,
    #[error("stack overflow")]
    Overflow = 2,
    #[error("division by zero")]
    DivideByZero = 3,
}

impl Fault {
    /// Numeric error code reported to hosts.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A fault together with where it happened.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{fault} executing {instruction:#04x} at {address:#06x}")]
pub struct Halt {
    pub instruction: u8,
    pub fault: Fault,
    pub address: u16,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineError {
    #[error("rom of {0} bytes does not fit in the program page")]
    RomTooLarge(usize),
}

/// Host side of the machine.
///
/// Callbacks run synchronously in the middle of an instruction and get the
/// machine back so they can inspect RAM or call `Machine::eval` again, as a
/// vectored device would.
pub trait Device {
    fn device_in(&mut self, machine: &mut Machine, port: u8) -> u8;

    fn device_out(&mut self, machine: &mut Machine, port: u8, value: u8);

    /// Called once when an instruction faults, before `eval` returns.
    fn halt(&mut self, instruction: u8, fault: Fault, address: u16) {
        let _ = (instruction, fault, address);
    }
}

pub struct Machine {
    ram: Box<[u8]>,
    working: Stack,
    ret: Stack,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            ram: vec![0u8; RAM_SIZE].into_boxed_slice(),
            working: Stack::new(WORKING_STACK_OFFSET),
            ret: Stack::new(RETURN_STACK_OFFSET),
        }
    }

    /// Copies a rom image to `PAGE_PROGRAM`.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), MachineError> {
        let start = usize::from(PAGE_PROGRAM);
        let end = start
            .checked_add(rom.len())
            .filter(|end| *end <= RAM_PAGE_SIZE)
            .ok_or(MachineError::RomTooLarge(rom.len()))?;
        let target = self
            .ram
            .get_mut(start..end)
            .ok_or(MachineError::RomTooLarge(rom.len()))?;
        target.copy_from_slice(rom);
        Ok(())
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn working_stack(&self) -> &[u8] {
        self.working.view(&self.ram)
    }

    pub fn return_stack(&self) -> &[u8] {
        self.ret.view(&self.ram)
    }

    /// The working stack with the RAM backing it, for hosts that seed
    /// arguments before calling `eval`.
    pub fn working_mut(&mut self) -> (&mut Stack, &mut [u8]) {
        self.stack_and_ram(false)
    }

    pub fn device(&self, port: u8) -> u8 {
        DEVICE_OFFSET
            .checked_add(usize::from(port))
            .and_then(|index| self.ram.get(index))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_device(&mut self, port: u8, value: u8) {
        if let Some(slot) = DEVICE_OFFSET
            .checked_add(usize::from(port))
            .and_then(|index| self.ram.get_mut(index))
        {
            *slot = value;
        }
    }

    pub fn peek8(&self, address: u16) -> u8 {
        self.ram.get(usize::from(address)).copied().unwrap_or(0)
    }

    /// Big-endian; the second byte wraps to address zero.
    pub fn peek16(&self, address: u16) -> u16 {
        u16::from_be_bytes([self.peek8(address), self.peek8(address.wrapping_add(1))])
    }

    pub fn poke8(&mut self, address: u16, value: u8) {
        if let Some(slot) = self.ram.get_mut(usize::from(address)) {
            *slot = value;
        }
    }

    pub fn poke16(&mut self, address: u16, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.poke8(address, high);
        self.poke8(address.wrapping_add(1), low);
    }

    pub(crate) fn stack(&self, ret: bool) -> &Stack {
        if ret { &self.ret } else { &self.working }
    }

    pub(crate) fn stack_and_ram(&mut self, ret: bool) -> (&mut Stack, &mut [u8]) {
        let stack = if ret { &mut self.ret } else { &mut self.working };
        (stack, &mut *self.ram)
    }

    /// Runs from `pc` until BRK, a zero program counter, a cleared enable
    /// byte or a fault. A fault is reported to `Device::halt` and returned.
    pub fn eval<D: Device + ?Sized>(&mut self, device: &mut D, pc: u16) -> Result<(), Halt> {
        let mut pc = pc;
        while pc != 0 && self.device(ENABLE_PORT) != 0 {
            let address = pc;
            let instruction = self.peek8(pc);
            pc = pc.wrapping_add(1);
            match self.step(device, instruction, pc) {
                Ok(Some(next)) => pc = next,
                Ok(None) => break,
                Err(fault) => {
                    tracing::debug!(
                        instruction,
                        address,
                        code = fault.code(),
                        "machine halted"
                    );
                    device.halt(instruction, fault, address);
                    return Err(Halt {
                        instruction,
                        fault,
                        address,
                    });
                }
            }
        }
        Ok(())
    }

    /// Executes one instruction whose operands start at `pc`. Returns the
    /// next program counter, or `None` on BRK.
    fn step<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        instruction: u8,
        pc: u16,
    ) -> Result<Option<u16>, Fault> {
        let mut d = Decoder::new(self, instruction);
        let mut pc = pc;
        match Op::from_instruction(instruction) {
            Op::Brk => match instruction {
                opcode::BRK => return Ok(None),
                opcode::JCI => {
                    let condition = d.pop8(self)?;
                    pc = if condition == 0 {
                        pc.wrapping_add(2)
                    } else {
                        relative_jump(self, pc)
                    };
                }
                opcode::JMI => pc = relative_jump(self, pc),
                opcode::JSI => {
                    self.ret.push16(&mut *self.ram, pc.wrapping_add(2))?;
                    pc = relative_jump(self, pc);
                }
                // LIT LIT2 LITr LIT2r
                _ => {
                    if d.short() {
                        let value = self.peek16(pc);
                        d.push16(self, value)?;
                        pc = pc.wrapping_add(2);
                    } else {
                        let value = self.peek8(pc);
                        d.push8(self, value)?;
                        pc = pc.wrapping_add(1);
                    }
                }
            },
            Op::Inc => {
                let a = d.pop(self)?;
                d.push(self, a.wrapping_add(1))?;
            }
            Op::Pop => {
                d.pop(self)?;
            }
            Op::Nip => {
                let b = d.pop(self)?;
                d.pop(self)?;
                d.push(self, b)?;
            }
            Op::Swp => {
                let b = d.pop(self)?;
                let a = d.pop(self)?;
                d.push(self, b)?;
                d.push(self, a)?;
            }
            Op::Rot => {
                let c = d.pop(self)?;
                let b = d.pop(self)?;
                let a = d.pop(self)?;
                d.push(self, b)?;
                d.push(self, c)?;
                d.push(self, a)?;
            }
            Op::Dup => {
                let a = d.pop(self)?;
                d.push(self, a)?;
                d.push(self, a)?;
            }
            Op::Ovr => {
                let b = d.pop(self)?;
                let a = d.pop(self)?;
                d.push(self, a)?;
                d.push(self, b)?;
                d.push(self, a)?;
            }
            Op::Equ => compare(self, &mut d, |a, b| a == b)?,
            Op::Neq => compare(self, &mut d, |a, b| a != b)?,
            Op::Gth => compare(self, &mut d, |a, b| a > b)?,
            Op::Lth => compare(self, &mut d, |a, b| a < b)?,
            Op::Jmp => {
                let address = d.pop(self)?;
                pc = d.jump(pc, address);
            }
            Op::Jcn => {
                let address = d.pop(self)?;
                if d.pop8(self)? != 0 {
                    pc = d.jump(pc, address);
                }
            }
            Op::Jsr => {
                let address = d.pop(self)?;
                d.push16_destination(self, pc)?;
                pc = d.jump(pc, address);
            }
            Op::Sth => {
                let a = d.pop(self)?;
                d.push_destination(self, a)?;
            }
            Op::Ldz => {
                let address = d.pop8(self)?;
                let value = d.peek(self, u16::from(address));
                d.push(self, value)?;
            }
            Op::Stz => {
                let address = d.pop8(self)?;
                let value = d.pop(self)?;
                d.poke(self, u16::from(address), value);
            }
            Op::Ldr => {
                let offset = d.pop8(self)? as i8;
                let value = d.peek(self, pc.wrapping_add_signed(i16::from(offset)));
                d.push(self, value)?;
            }
            Op::Str => {
                let offset = d.pop8(self)? as i8;
                let value = d.pop(self)?;
                d.poke(self, pc.wrapping_add_signed(i16::from(offset)), value);
            }
            Op::Lda => {
                let address = d.pop16(self)?;
                let value = d.peek(self, address);
                d.push(self, value)?;
            }
            Op::Sta => {
                let address = d.pop16(self)?;
                let value = d.pop(self)?;
                d.poke(self, address, value);
            }
            Op::Dei => {
                let port = d.pop8(self)?;
                let value = d.device_read(self, device, port);
                d.push(self, value)?;
            }
            Op::Deo => {
                let port = d.pop8(self)?;
                let value = d.pop(self)?;
                d.device_write(self, device, port, value);
            }
            Op::Add => arithmetic(self, &mut d, |a, b| Ok(a.wrapping_add(b)))?,
            Op::Sub => arithmetic(self, &mut d, |a, b| Ok(a.wrapping_sub(b)))?,
            Op::Mul => arithmetic(self, &mut d, |a, b| Ok(a.wrapping_mul(b)))?,
            Op::Div => arithmetic(self, &mut d, |a, b| {
                a.checked_div(b).ok_or(Fault::DivideByZero)
            })?,
            Op::And => arithmetic(self, &mut d, |a, b| Ok(a & b))?,
            Op::Ora => arithmetic(self, &mut d, |a, b| Ok(a | b))?,
            Op::Eor => arithmetic(self, &mut d, |a, b| Ok(a ^ b))?,
            Op::Sft => {
                let shift = d.pop8(self)?;
                let value = d.pop(self)?;
                let right = u32::from(shift & 0x0f);
                let left = u32::from(shift.wrapping_shr(4));
                let shifted = value
                    .checked_shr(right)
                    .and_then(|value| value.checked_shl(left))
                    .unwrap_or(0);
                d.push(self, shifted)?;
            }
        }
        Ok(Some(pc))
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// Target of an immediate jump whose signed offset follows the opcode.
fn relative_jump(machine: &Machine, pc: u16) -> u16 {
    pc.wrapping_add(machine.peek16(pc)).wrapping_add(2)
}

fn compare(
    machine: &mut Machine,
    d: &mut Decoder,
    test: impl Fn(u16, u16) -> bool,
) -> Result<(), Fault> {
    let b = d.pop(machine)?;
    let a = d.pop(machine)?;
    d.push8(machine, u8::from(test(a, b)))
}

fn arithmetic(
    machine: &mut Machine,
    d: &mut Decoder,
    apply: impl Fn(u16, u16) -> Result<u16, Fault>,
) -> Result<(), Fault> {
    let b = d.pop(machine)?;
    let a = d.pop(machine)?;
    d.push(machine, apply(a, b)?)
}

/// A machine bundled with the device it talks to.
pub struct Uxn<D> {
    pub machine: Machine,
    pub device: D,
}

impl<D: Device> Uxn<D> {
    pub fn new(device: D) -> Self {
        Self {
            machine: Machine::new(),
            device,
        }
    }

    pub fn eval(&mut self, pc: u16) -> Result<(), Halt> {
        self.machine.eval(&mut self.device, pc)
    }
}
