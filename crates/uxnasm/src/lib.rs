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

use std::fmt;
use std::io;

use thiserror_no_std::Error;

pub mod assembler;
pub mod labels;
pub mod macros;
pub mod source;
pub mod symbols;
pub mod tokenizer;

pub use assembler::Assembler;
pub use source::{FileLoader, MemoryLoader, SourceLoader};

#[cfg(test)]
mod assembler_test;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
    #[error("invalid token")]
    InvalidToken,
    #[error("malformed comment")]
    MalformedComment,
    #[error("invalid padding")]
    InvalidPadding,
    #[error("invalid hex literal")]
    InvalidHexLiteral,
    #[error("macro name is invalid")]
    InvalidMacroName,
    #[error("macro duplicate")]
    DuplicateMacro,
    #[error("macro defined inside a macro body")]
    NestedMacro,
    #[error("macro size exceeded")]
    MacroTooLong,
    #[error("macro body is not closed")]
    UnterminatedMacro,
    #[error("label name is invalid")]
    InvalidLabelName,
    #[error("label duplicate")]
    DuplicateLabel,
    #[error("sub-label length too long")]
    SubLabelTooLong,
    #[error("labels limit exceeded")]
    MaxLabelsExceeded,
    #[error("macros limit exceeded")]
    MaxMacrosExceeded,
    #[error("references limit exceeded")]
    MaxReferencesExceeded,
    #[error("unknown reference")]
    UnknownReference,
    #[error("relative reference is too far")]
    ReferenceTooFar,
    #[error("writing in zero page")]
    ZeroPageWrite,
    #[error("memory overwrite")]
    MemoryOverwrite,
    #[error("writing after end of program memory")]
    ImageOverflow,
    #[error("include missing")]
    IncludeMissing,
    #[error("could not read input file")]
    UnreadableInput,
    #[error("could not write output file ({0:?})")]
    OutputWrite(io::ErrorKind),
    #[error("output rom is empty")]
    EmptyRom,
    #[error("macros and includes nested too deeply")]
    NestingTooDeep,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("{0}")]
    Kind(AssemblerErrorKind),
    #[error("{kind}: {token}")]
    WithToken {
        token: String,
        kind: AssemblerErrorKind,
    },
}

impl AssemblerError {
    /// Attaches the offending token unless one is already attached. Errors
    /// from nested includes and macros keep the innermost token.
    pub(crate) fn with_token(self, token: &str) -> Self {
        match self {
            AssemblerError::WithToken { .. } => self,
            AssemblerError::Kind(kind) => AssemblerError::WithToken {
                token: String::from(token),
                kind,
            },
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Kind(_) => None,
            Self::WithToken { token, .. } => Some(token),
        }
    }

    pub fn error_kind(&self) -> &AssemblerErrorKind {
        match self {
            Self::Kind(kind) => kind,
            Self::WithToken { kind, .. } => kind,
        }
    }
}

impl From<AssemblerErrorKind> for AssemblerError {
    fn from(kind: AssemblerErrorKind) -> Self {
        AssemblerError::Kind(kind)
    }
}

/// What a successful compile produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub output: String,
    pub rom_length: usize,
    pub labels: usize,
    pub macros: usize,
    pub unused_labels: Vec<String>,
    pub symbols_written: bool,
}

impl Summary {
    /// Share of the 64 KiB address space used by the rom, in percent.
    pub fn percent_used(&self) -> f64 {
        // Lossless for anything that fits in a program page.
        let length = u32::try_from(self.rom_length).unwrap_or(u32::MAX);
        f64::from(length) / 652.80
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Assembled {} in {} bytes ({:.2}% used), {} labels and {} macros",
            self.output,
            self.rom_length,
            self.percent_used(),
            self.labels,
            self.macros
        )
    }
}

/// Assembles `input` from the filesystem into the rom file `output`.
pub fn compile(input: &str, output: &str) -> Result<Summary, AssemblerError> {
    compile_with(FileLoader, input, output)
}

/// Assembles `input` read through `loader`, then writes the rom, logs the
/// review and writes the symbol file next to the rom.
pub fn compile_with<L: SourceLoader>(
    loader: L,
    input: &str,
    output: &str,
) -> Result<Summary, AssemblerError> {
    let mut assembler = Assembler::new(loader);
    assembler.assemble_file(input)?;
    let rom = assembler.rom();
    if rom.is_empty() {
        return Err(AssemblerError::from(AssemblerErrorKind::EmptyRom).with_token(input));
    }
    std::fs::write(output, rom).map_err(|err| {
        AssemblerError::from(AssemblerErrorKind::OutputWrite(err.kind())).with_token(output)
    })?;

    let unused_labels: Vec<String> = assembler
        .labels()
        .unused_labels()
        .map(|label| String::from(label.name.as_str()))
        .collect();
    for name in &unused_labels {
        tracing::warn!("-- Unused label: {name}");
    }

    let symbols_written = symbols::write_symbols(output, assembler.labels())?;

    let summary = Summary {
        output: String::from(output),
        rom_length: rom.len(),
        labels: assembler.labels().len(),
        macros: assembler.macro_count(),
        unused_labels,
        symbols_written,
    };
    tracing::info!("{summary}");
    Ok(summary)
}
