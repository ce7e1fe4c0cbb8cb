use core::mem::transmute;
use variant_count::VariantCount;

/// Operand width bit: the instruction works on shorts.
pub const SHORT: u8 = 0x20;
/// Swaps the roles of the working and return stacks.
pub const RETURN: u8 = 0x40;
/// Reads from the source stack without consuming.
pub const KEEP: u8 = 0x80;
pub const OPCODE_MASK: u8 = 0x1f;

/// Base mnemonics indexed by the low five bits of an instruction.
pub const MNEMONICS: [&str; 32] = [
    "LIT", "INC", "POP", "NIP", "SWP", "ROT", "DUP", "OVR",
    "EQU", "NEQ", "GTH", "LTH", "JMP", "JCN", "JSR", "STH",
    "LDZ", "STZ", "LDR", "STR", "LDA", "STA", "DEI", "DEO",
    "ADD", "SUB", "MUL", "DIV", "AND", "ORA", "EOR", "SFT",
];

pub const BRK: u8 = 0x00;
pub const JCI: u8 = 0x20;
pub const JMI: u8 = 0x40;
pub const JSI: u8 = 0x60;
pub const LIT: u8 = 0x80;
pub const LIT2: u8 = 0xa0;

#[repr(u8)]
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Base zero: BRK, the immediate jumps and the literals.
    Brk,
    Inc,
    Pop,
    Nip,
    Swp,
    Rot,
    Dup,
    Ovr,
    Equ,
    Neq,
    Gth,
    Lth,
    Jmp,
    Jcn,
    Jsr,
    Sth,
    Ldz,
    Stz,
    Ldr,
    Str,
    Lda,
    Sta,
    Dei,
    Deo,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Ora,
    Eor,
    Sft,
}

impl Op {
    /// Base opcode of an instruction byte, ignoring the mode bits.
    pub fn from_instruction(instruction: u8) -> Self {
        const {
            assert!(Op::VARIANT_COUNT == OPCODE_MASK as usize + 1);
        }
        // SAFTY: the mask keeps the value below VARIANT_COUNT and Op is repr(u8).
        unsafe { transmute::<u8, Self>(instruction & OPCODE_MASK) }
    }
}

impl From<Op> for u8 {
    fn from(op: Op) -> u8 {
        op as u8
    }
}

/// Mode bits of an instruction byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub short: bool,
    pub ret: bool,
    pub keep: bool,
}

impl Mode {
    pub const fn from_instruction(instruction: u8) -> Self {
        Self {
            short: instruction & SHORT != 0,
            ret: instruction & RETURN != 0,
            keep: instruction & KEEP != 0,
        }
    }
}

/// Encodes a mnemonic such as `ADD2k` or `JMP2r`.
///
/// The first three characters select the base opcode and every following
/// character must be one of the `2`, `r` or `k` mode suffixes. `LIT` always
/// carries the keep bit. The bare word `BRK` encodes to zero; `BRK` with
/// suffixes is not an instruction.
pub fn find(token: &str) -> Option<u8> {
    if token == "BRK" {
        return Some(BRK);
    }
    let base = token.get(..3)?;
    let suffixes = token.get(3..)?;
    let index = MNEMONICS.iter().position(|mnemonic| *mnemonic == base)?;
    let mut byte = u8::try_from(index).ok()?;
    if byte == 0 {
        byte |= KEEP;
    }
    for suffix in suffixes.chars() {
        match suffix {
            '2' => byte |= SHORT,
            'r' => byte |= RETURN,
            'k' => byte |= KEEP,
            _ => return None,
        }
    }
    Some(byte)
}

/// Name of the base instruction for any byte, without mode suffixes.
pub fn base_name(instruction: u8) -> &'static str {
    match (instruction & OPCODE_MASK, instruction.wrapping_shr(5)) {
        (0, 0) => "BRK",
        (0, 1) => "JCI",
        (0, 2) => "JMI",
        (0, 3) => "JSI",
        (index, _) => MNEMONICS.get(usize::from(index)).copied().unwrap_or("LIT"),
    }
}

/// True when the token encodes to an instruction.
pub fn is_mnemonic(token: &str) -> bool {
    find(token).is_some()
}
