use crate::Fault;

/// Bytes reserved for each stack in the last RAM page.
pub const STACK_SIZE: usize = 0x100;

/// A stack is a window of RAM plus a depth pointer. The bytes live in the
/// machine's RAM so hosts can inspect them directly; the stack itself only
/// tracks where its window starts and how deep it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stack {
    offset: usize,
    pointer: u8,
}

impl Stack {
    pub const fn new(offset: usize) -> Self {
        Self { offset, pointer: 0 }
    }

    pub fn pointer(&self) -> u8 {
        self.pointer
    }

    pub fn set_pointer(&mut self, pointer: u8) {
        self.pointer = pointer;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.pointer == 0
    }

    /// The live bytes of the stack, bottom first.
    pub fn view<'r>(&self, ram: &'r [u8]) -> &'r [u8] {
        let end = self.offset.saturating_add(usize::from(self.pointer));
        ram.get(self.offset..end).unwrap_or(&[])
    }

    pub fn push8(&mut self, ram: &mut [u8], value: u8) -> Result<(), Fault> {
        if self.pointer == u8::MAX {
            return Err(Fault::Overflow);
        }
        self.write(ram, self.pointer, value)?;
        self.pointer = self.pointer.wrapping_add(1);
        Ok(())
    }

    /// Pushes a short high byte first.
    pub fn push16(&mut self, ram: &mut [u8], value: u16) -> Result<(), Fault> {
        if self.pointer >= 0xfe {
            return Err(Fault::Overflow);
        }
        let [high, low] = value.to_be_bytes();
        self.write(ram, self.pointer, high)?;
        self.write(ram, self.pointer.wrapping_add(1), low)?;
        self.pointer = self.pointer.wrapping_add(2);
        Ok(())
    }

    pub fn pop8(&mut self, ram: &[u8]) -> Result<u8, Fault> {
        let (value, pointer) = self.take8(ram, self.pointer)?;
        self.pointer = pointer;
        Ok(value)
    }

    pub fn pop16(&mut self, ram: &[u8]) -> Result<u16, Fault> {
        let (value, pointer) = self.take16(ram, self.pointer)?;
        self.pointer = pointer;
        Ok(value)
    }

    /// Reads the byte below `cursor` without touching the stored pointer.
    /// Returns the value and the lowered cursor.
    pub fn take8(&self, ram: &[u8], cursor: u8) -> Result<(u8, u8), Fault> {
        let cursor = cursor.checked_sub(1).ok_or(Fault::Underflow)?;
        Ok((self.read(ram, cursor)?, cursor))
    }

    pub fn take16(&self, ram: &[u8], cursor: u8) -> Result<(u16, u8), Fault> {
        let cursor = cursor.checked_sub(2).ok_or(Fault::Underflow)?;
        let high = self.read(ram, cursor)?;
        let low = self.read(ram, cursor.wrapping_add(1))?;
        Ok((u16::from_be_bytes([high, low]), cursor))
    }

    fn slot(&self, index: u8) -> Option<usize> {
        self.offset.checked_add(usize::from(index))
    }

    fn read(&self, ram: &[u8], index: u8) -> Result<u8, Fault> {
        self.slot(index)
            .and_then(|slot| ram.get(slot))
            .copied()
            .ok_or(Fault::Underflow)
    }

    fn write(&self, ram: &mut [u8], index: u8, value: u8) -> Result<(), Fault> {
        let slot = self
            .slot(index)
            .and_then(|slot| ram.get_mut(slot))
            .ok_or(Fault::Overflow)?;
        *slot = value;
        Ok(())
    }
}
