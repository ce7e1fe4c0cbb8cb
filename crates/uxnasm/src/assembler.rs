// Two-pass assembler for uxn source.
//
// Pass one walks the words of the entry file, following includes and macro
// bodies in place, writes every byte it can and leaves 0xff placeholders
// where a label is used. Each placeholder is remembered as a Reference.
// Pass two patches the placeholders once every label is known.

use uxn::opcode::{self, find};

use crate::labels::{sub_label, to_name, LabelTable, Name, DEFAULT_SCOPE, MAX_LABELS};
use crate::macros::{MacroTable, MAX_MACROS};
use crate::source::SourceLoader;
use crate::tokenizer::{hex_value, is_hex, Tokenizer};
use crate::{AssemblerError, AssemblerErrorKind};

pub const MAX_REFERENCES: usize = 0x1000;
/// Bytes of program memory; the last address is never writable.
pub const PROGRAM_SIZE: usize = 0xffff;
/// First writable address. The rom starts here.
pub const TRIM: u16 = 0x0100;
/// Words this long or longer are rejected.
pub const MAX_TOKEN_LENGTH: usize = 0x3f;
/// Longest word accepted directly from the entry source.
pub const MAX_ENTRY_WORD_LENGTH: usize = 0x3d;
/// How deep includes and macro expansions may nest.
pub const MAX_NESTING: usize = 0x40;

/// How a reference is patched once its label is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    /// One signed byte, relative to the byte after the placeholder.
    RelativeByte,
    /// Low byte of the address.
    ZeroPage,
    /// The full address.
    Absolute,
    /// A signed short, relative to the byte after the placeholder.
    RelativeShort,
}

#[derive(Debug)]
struct Reference {
    name: Name,
    site: u16,
    kind: RefKind,
}

pub struct Assembler<
    L,
    const LABEL_CAP: usize = MAX_LABELS,
    const MACRO_CAP: usize = MAX_MACROS,
    const REFERENCE_CAP: usize = MAX_REFERENCES,
> {
    loader: L,
    labels: LabelTable<LABEL_CAP>,
    macros: MacroTable<MACRO_CAP>,
    references: Vec<Reference>,
    data: Vec<u8>,
    pointer: u16,
    length: usize,
    scope: Name,
    depth: usize,
}

impl<L: SourceLoader> Assembler<L> {
    pub fn new(loader: L) -> Self {
        Self::with_caps(loader)
    }
}

impl<L: SourceLoader, const LABEL_CAP: usize, const MACRO_CAP: usize, const REFERENCE_CAP: usize>
    Assembler<L, LABEL_CAP, MACRO_CAP, REFERENCE_CAP>
{
    pub fn with_caps(loader: L) -> Self {
        Self {
            loader,
            labels: LabelTable::new(),
            macros: MacroTable::new(),
            references: Vec::new(),
            data: vec![0; PROGRAM_SIZE],
            pointer: TRIM,
            length: 0,
            scope: Name::new(),
            depth: 0,
        }
    }

    /// Loads `path` through the loader and assembles it.
    pub fn assemble_file(&mut self, path: &str) -> Result<(), AssemblerError> {
        let source = self.loader.load(path).map_err(|_| {
            AssemblerError::from(AssemblerErrorKind::UnreadableInput).with_token(path)
        })?;
        self.assemble(&source)
    }

    /// Runs both passes over `source`.
    pub fn assemble(&mut self, source: &str) -> Result<(), AssemblerError> {
        self.pointer = TRIM;
        self.scope = to_name(DEFAULT_SCOPE)?;

        tracing::trace!("starting pass 1");
        let mut words = Tokenizer::new(source);
        while let Some(word) = words.next() {
            if word.len() > MAX_ENTRY_WORD_LENGTH {
                return Err(AssemblerError::from(AssemblerErrorKind::InvalidToken).with_token(word));
            }
            self.parse(word, &mut words)?;
        }
        tracing::debug!(
            labels = self.labels.len(),
            macros = self.macros.len(),
            references = self.references.len(),
            "pass 1 complete"
        );

        tracing::trace!("starting pass 2");
        self.resolve()
    }

    /// The assembled program from `TRIM` to the last written byte.
    pub fn rom(&self) -> &[u8] {
        self.data
            .get(usize::from(TRIM)..self.length)
            .unwrap_or(&[])
    }

    pub fn labels(&self) -> &LabelTable<LABEL_CAP> {
        &self.labels
    }

    pub fn macro_count(&self) -> usize {
        self.macros.len()
    }

    /// Handles one word. Runes that need more input (comments and macro
    /// definitions) pull it from `words`.
    fn parse<'w>(
        &mut self,
        word: &str,
        words: &mut dyn Iterator<Item = &'w str>,
    ) -> Result<(), AssemblerError> {
        self.parse_word(word, words)
            .map_err(|err| err.with_token(word))
    }

    fn parse_word<'w>(
        &mut self,
        word: &str,
        words: &mut dyn Iterator<Item = &'w str>,
    ) -> Result<(), AssemblerError> {
        if word.len() >= MAX_TOKEN_LENGTH {
            return Err(AssemblerErrorKind::InvalidToken.into());
        }
        let mut chars = word.chars();
        let Some(rune) = chars.next() else {
            return Ok(());
        };
        let rest = chars.as_str();

        match rune {
            '(' => self.skip_comment(word, words)?,
            '~' => self.include(rest)?,
            '%' => {
                self.macros.define(rest, words)?;
                tracing::debug!(name = rest, "defined macro");
            }
            '|' => {
                if !is_hex(rest) {
                    return Err(AssemblerErrorKind::InvalidPadding.into());
                }
                self.pointer = hex_value(rest);
            }
            '$' => {
                if !is_hex(rest) {
                    return Err(AssemblerErrorKind::InvalidPadding.into());
                }
                self.pointer = self.pointer.wrapping_add(hex_value(rest));
            }
            '@' => {
                self.labels.define(rest, self.pointer)?;
                self.scope = to_name(rest)?;
            }
            '&' => {
                let name = sub_label(&self.scope, rest)?;
                self.labels.define(&name, self.pointer)?;
            }
            '#' => match (is_hex(rest), word.len()) {
                (true, 3) => self.write_lit_byte(hex_byte(rest))?,
                (true, 5) => {
                    self.write_byte(opcode::LIT2)?;
                    self.write_short(hex_value(rest))?;
                }
                _ => return Err(AssemblerErrorKind::InvalidHexLiteral.into()),
            },
            '_' => {
                self.make_reference(rest, RefKind::RelativeByte, self.pointer)?;
                self.write_byte(0xff)?;
            }
            ',' => {
                self.make_reference(rest, RefKind::RelativeByte, self.pointer.wrapping_add(1))?;
                self.write_lit_byte(0xff)?;
            }
            '-' => {
                self.make_reference(rest, RefKind::ZeroPage, self.pointer)?;
                self.write_byte(0xff)?;
            }
            '.' => {
                self.make_reference(rest, RefKind::ZeroPage, self.pointer.wrapping_add(1))?;
                self.write_lit_byte(0xff)?;
            }
            ':' | '=' => {
                self.make_reference(rest, RefKind::Absolute, self.pointer)?;
                self.write_short(0xffff)?;
            }
            ';' => {
                self.make_reference(rest, RefKind::Absolute, self.pointer.wrapping_add(1))?;
                self.write_byte(opcode::LIT2)?;
                self.write_short(0xffff)?;
            }
            '?' => self.write_jump(opcode::JCI, rest)?,
            '!' => self.write_jump(opcode::JMI, rest)?,
            '"' => {
                for byte in rest.bytes() {
                    self.write_byte(byte)?;
                }
            }
            '[' | ']' if rest.is_empty() => {}
            _ => self.parse_plain(word)?,
        }
        Ok(())
    }

    /// Words without a rune: opcodes, raw hex, macros and implicit calls.
    fn parse_plain(&mut self, word: &str) -> Result<(), AssemblerError> {
        if let Some(byte) = find(word) {
            return self.write_byte(byte);
        }
        if is_hex(word) {
            match word.len() {
                2 => return self.write_byte(hex_byte(word)),
                4 => return self.write_short(hex_value(word)),
                _ => {}
            }
        }
        if let Some(body) = self.macros.expand(word) {
            return self.nested(|this| {
                let mut words = body.iter().map(|item| item.as_str());
                while let Some(item) = words.next() {
                    this.parse(item, &mut words)?;
                }
                Ok(())
            });
        }
        self.write_jump(opcode::JSI, word)
    }

    /// Skips to the `)` matching the opening `(`. Only single character
    /// parentheses count towards nesting.
    fn skip_comment<'w>(
        &mut self,
        word: &str,
        words: &mut dyn Iterator<Item = &'w str>,
    ) -> Result<(), AssemblerError> {
        if word.len() != 1 {
            return Err(AssemblerErrorKind::MalformedComment.into());
        }
        let mut depth = 1usize;
        loop {
            match words.next() {
                Some("(") => depth = depth.saturating_add(1),
                Some(")") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Err(AssemblerErrorKind::MalformedComment.into()),
            }
        }
    }

    fn include(&mut self, path: &str) -> Result<(), AssemblerError> {
        tracing::debug!(path, "including");
        let source = self
            .loader
            .load(path)
            .map_err(|_| AssemblerError::from(AssemblerErrorKind::IncludeMissing))?;
        self.nested(|this| {
            let mut words = Tokenizer::new(&source);
            while let Some(word) = words.next() {
                this.parse(word, &mut words)?;
            }
            Ok(())
        })
    }

    fn nested(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<(), AssemblerError>,
    ) -> Result<(), AssemblerError> {
        if self.depth >= MAX_NESTING {
            return Err(AssemblerErrorKind::NestingTooDeep.into());
        }
        self.depth = self.depth.saturating_add(1);
        let result = body(self);
        self.depth = self.depth.saturating_sub(1);
        result
    }

    fn make_reference(&mut self, label: &str, kind: RefKind, site: u16) -> Result<(), AssemblerError> {
        if self.references.len() >= REFERENCE_CAP {
            return Err(AssemblerErrorKind::MaxReferencesExceeded.into());
        }
        let name = match label.strip_prefix('&') {
            Some(child) => sub_label(&self.scope, child)?,
            None => {
                if let Some((parent, _)) = label.split_once('/') {
                    if !parent.is_empty() {
                        self.labels.increment_reference(parent);
                    }
                }
                to_name(label)?
            }
        };
        self.references.push(Reference { name, site, kind });
        Ok(())
    }

    /// An immediate jump or call opcode followed by a placeholder offset.
    fn write_jump(&mut self, op: u8, label: &str) -> Result<(), AssemblerError> {
        self.make_reference(label, RefKind::RelativeShort, self.pointer.wrapping_add(1))?;
        self.write_byte(op)?;
        self.write_short(0xffff)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), AssemblerError> {
        if self.pointer < TRIM {
            return Err(AssemblerErrorKind::ZeroPageWrite.into());
        }
        let at = usize::from(self.pointer);
        if at < self.length {
            return Err(AssemblerErrorKind::MemoryOverwrite.into());
        }
        let slot = self
            .data
            .get_mut(at)
            .ok_or(AssemblerErrorKind::ImageOverflow)?;
        *slot = byte;
        self.pointer = self.pointer.wrapping_add(1);
        self.length = at.saturating_add(1);
        Ok(())
    }

    fn write_short(&mut self, value: u16) -> Result<(), AssemblerError> {
        let [high, low] = value.to_be_bytes();
        self.write_byte(high)?;
        self.write_byte(low)
    }

    fn write_lit_byte(&mut self, byte: u8) -> Result<(), AssemblerError> {
        self.write_byte(opcode::LIT)?;
        self.write_byte(byte)
    }

    fn resolve(&mut self) -> Result<(), AssemblerError> {
        let references = std::mem::take(&mut self.references);
        for reference in &references {
            self.patch(reference)
                .map_err(|err| err.with_token(&reference.name))?;
            self.labels.increment_reference(&reference.name);
        }
        tracing::debug!(count = references.len(), "resolved references");
        Ok(())
    }

    fn patch(&mut self, reference: &Reference) -> Result<(), AssemblerError> {
        let target = self.labels.lookup(&reference.name)?.address;
        let site = reference.site;
        match reference.kind {
            RefKind::RelativeByte => {
                let offset = i32::from(target).wrapping_sub(i32::from(site).wrapping_add(2));
                let offset = i8::try_from(offset)
                    .map_err(|_| AssemblerErrorKind::ReferenceTooFar)?;
                let [byte] = offset.to_be_bytes();
                self.patch_byte(site, byte)
            }
            RefKind::ZeroPage => {
                let [_, low] = target.to_be_bytes();
                self.patch_byte(site, low)
            }
            RefKind::Absolute => self.patch_short(site, target),
            RefKind::RelativeShort => {
                self.patch_short(site, target.wrapping_sub(site.wrapping_add(2)))
            }
        }
    }

    fn patch_byte(&mut self, site: u16, byte: u8) -> Result<(), AssemblerError> {
        let slot = self
            .data
            .get_mut(usize::from(site))
            .ok_or(AssemblerErrorKind::ImageOverflow)?;
        *slot = byte;
        Ok(())
    }

    fn patch_short(&mut self, site: u16, value: u16) -> Result<(), AssemblerError> {
        let [high, low] = value.to_be_bytes();
        self.patch_byte(site, high)?;
        self.patch_byte(site.wrapping_add(1), low)
    }
}

fn hex_byte(token: &str) -> u8 {
    let [_, low] = hex_value(token).to_be_bytes();
    low
}
