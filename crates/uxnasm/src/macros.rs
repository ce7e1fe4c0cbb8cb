use heapless::Vec as BoundedVec;

use crate::labels::{is_reserved, to_name, Name};
use crate::AssemblerErrorKind;

pub const MAX_MACROS: usize = 0x100;
pub const MAX_MACRO_TOKENS: usize = 0x40;

pub type MacroBody = BoundedVec<Name, MAX_MACRO_TOKENS>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: Name,
    pub body: MacroBody,
}

pub struct MacroTable<const CAP: usize = MAX_MACROS> {
    macros: Vec<Macro>,
}

impl<const CAP: usize> MacroTable<CAP> {
    pub fn new() -> Self {
        Self { macros: Vec::new() }
    }

    /// Defines `name` with a body read from `words`.
    ///
    /// Braces are not matched: words starting with `{` are skipped and the
    /// first word starting with `}` ends the body.
    pub fn define<'w>(
        &mut self,
        name: &str,
        words: &mut dyn Iterator<Item = &'w str>,
    ) -> Result<(), AssemblerErrorKind> {
        if self.find(name).is_some() {
            return Err(AssemblerErrorKind::DuplicateMacro);
        }
        if is_reserved(name) {
            return Err(AssemblerErrorKind::InvalidMacroName);
        }
        if self.macros.len() >= CAP {
            return Err(AssemblerErrorKind::MaxMacrosExceeded);
        }

        let mut body = MacroBody::new();
        loop {
            let word = words.next().ok_or(AssemblerErrorKind::UnterminatedMacro)?;
            if word.starts_with('{') {
                continue;
            }
            if word.starts_with('}') {
                break;
            }
            if word.starts_with('%') {
                return Err(AssemblerErrorKind::NestedMacro);
            }
            body.push(to_name(word)?)
                .map_err(|_| AssemblerErrorKind::MacroTooLong)?;
        }

        self.macros.push(Macro {
            name: to_name(name)?,
            body,
        });
        Ok(())
    }

    /// A copy of the body of `name`, ready to be parsed in place.
    pub fn expand(&self, name: &str) -> Option<MacroBody> {
        self.find(name).map(|found| found.body.clone())
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    fn find(&self, name: &str) -> Option<&Macro> {
        self.macros.iter().find(|found| found.name.as_str() == name)
    }
}

impl<const CAP: usize> Default for MacroTable<CAP> {
    fn default() -> Self {
        Self::new()
    }
}
