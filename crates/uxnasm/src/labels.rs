use heapless::String;

use crate::tokenizer::is_hex;
use crate::AssemblerErrorKind;

pub const NAME_CAP: usize = 0x40;
pub const MAX_LABELS: usize = 0x400;

/// Scope used until the first `@label`.
pub const DEFAULT_SCOPE: &str = "on-reset";

pub type Name = String<NAME_CAP>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: Name,
    pub address: u16,
    pub references: u32,
}

impl Label {
    /// Uppercase labels name device ports and are exempt from the unused check.
    pub fn is_device(&self) -> bool {
        self.name.starts_with(|c: char| c.is_ascii_uppercase())
    }
}

/// Labels in definition order. Lookups are linear; the table is capped at
/// `CAP` entries.
pub struct LabelTable<const CAP: usize = MAX_LABELS> {
    labels: Vec<Label>,
}

impl<const CAP: usize> LabelTable<CAP> {
    pub fn new() -> Self {
        Self { labels: Vec::new() }
    }

    pub fn define(&mut self, name: &str, address: u16) -> Result<(), AssemblerErrorKind> {
        if self.find(name).is_some() {
            return Err(AssemblerErrorKind::DuplicateLabel);
        }
        if is_reserved(name) {
            return Err(AssemblerErrorKind::InvalidLabelName);
        }
        if self.labels.len() >= CAP {
            return Err(AssemblerErrorKind::MaxLabelsExceeded);
        }
        self.labels.push(Label {
            name: to_name(name)?,
            address,
            references: 0,
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Label, AssemblerErrorKind> {
        self.find(name).ok_or(AssemblerErrorKind::UnknownReference)
    }

    /// Counts a use of `name`. Unknown names are ignored.
    pub fn increment_reference(&mut self, name: &str) {
        if let Some(label) = self.labels.iter_mut().find(|label| label.name.as_str() == name) {
            label.references = label.references.saturating_add(1);
        }
    }

    pub fn unused_labels(&self) -> impl Iterator<Item = &Label> {
        self.labels
            .iter()
            .filter(|label| !label.is_device() && label.references == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn find(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|label| label.name.as_str() == name)
    }
}

impl<const CAP: usize> Default for LabelTable<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefixes `name` with its scope: `scope/name`.
pub fn sub_label(scope: &str, name: &str) -> Result<Name, AssemblerErrorKind> {
    let length = scope.len().saturating_add(name.len());
    if length >= NAME_CAP.saturating_sub(1) {
        return Err(AssemblerErrorKind::SubLabelTooLong);
    }
    let mut out = Name::new();
    for part in [scope, "/", name] {
        out.push_str(part)
            .map_err(|_| AssemblerErrorKind::SubLabelTooLong)?;
    }
    Ok(out)
}

/// Names that would read as something else: short hex literals, opcodes
/// and the empty string.
pub(crate) fn is_reserved(name: &str) -> bool {
    (is_hex(name) && matches!(name.len(), 2 | 4))
        || uxn::opcode::is_mnemonic(name)
        || name.is_empty()
}

pub(crate) fn to_name(name: &str) -> Result<Name, AssemblerErrorKind> {
    let mut out = Name::new();
    out.push_str(name)
        .map_err(|_| AssemblerErrorKind::InvalidToken)?;
    Ok(out)
}
