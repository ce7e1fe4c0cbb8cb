use crate::labels::LabelTable;
use crate::{AssemblerError, AssemblerErrorKind};

/// Longest rom path that still gets a `.sym` file next to it.
pub const MAX_SYMBOL_PATH: usize = 0x60 - 5;

/// Symbol file layout: for each label in definition order, the address as
/// two big-endian bytes followed by the name bytes. There is no separator
/// or terminator.
pub fn encode<const CAP: usize>(labels: &LabelTable<CAP>) -> Vec<u8> {
    let mut out = Vec::new();
    for label in labels.iter() {
        out.extend_from_slice(&label.address.to_be_bytes());
        out.extend_from_slice(label.name.as_bytes());
    }
    out
}

pub fn symbol_path(rom_path: &str) -> Option<String> {
    if rom_path.len() > MAX_SYMBOL_PATH {
        return None;
    }
    Some(format!("{rom_path}.sym"))
}

/// Writes `<rom_path>.sym`. Returns false when the path is too long and the
/// file was skipped.
pub fn write_symbols<const CAP: usize>(
    rom_path: &str,
    labels: &LabelTable<CAP>,
) -> Result<bool, AssemblerError> {
    let Some(path) = symbol_path(rom_path) else {
        tracing::debug!(rom_path, "path too long, skipping symbol file");
        return Ok(false);
    };
    std::fs::write(&path, encode(labels)).map_err(|err| {
        AssemblerError::from(AssemblerErrorKind::OutputWrite(err.kind())).with_token(&path)
    })?;
    Ok(true)
}
