const DELIMITERS: [char; 4] = [' ', '\n', '\t', '\r'];

/// Splits buffered source text into words. Runs of delimiters never
/// produce empty words, and the iterator ends at the end of the text.
pub struct Tokenizer<'a> {
    rest: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { rest: source }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest.trim_start_matches(DELIMITERS);
        let end = rest.find(DELIMITERS).unwrap_or(rest.len());
        let (word, tail) = rest.split_at_checked(end)?;
        self.rest = tail;
        if word.is_empty() { None } else { Some(word) }
    }
}

/// Lowercase hex digits only, at least one of them.
pub fn is_hex(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Value of a hex token, keeping the low 16 bits of longer numbers.
pub fn hex_value(token: &str) -> u16 {
    token
        .chars()
        .filter_map(|c| c.to_digit(16))
        .fold(0u16, |value, digit| value.wrapping_shl(4) | digit as u16)
}
