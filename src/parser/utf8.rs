/// Outcome of feeding one byte to the incremental UTF-8 decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Step {
    /// More continuation bytes are required.
    Pending,
    /// A complete scalar value was decoded.
    Produced(char),
    /// The byte was rejected and consumed; emit U+FFFD.
    Invalid,
    /// A pending sequence was rejected by this byte; emit U+FFFD and feed
    /// the byte again from the ground state.
    InvalidReprocess,
}

/// Incremental UTF-8 decoder used by the parser's ground state.
///
/// Follows the Unicode "maximal subsequence" recommendation: each
/// ill-formed maximal subsequence yields exactly one U+FFFD, and the byte
/// that broke a pending sequence is re-examined as the start of the next.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    codepoint: u32,
    remaining: u8,
    /// Acceptable range for the next continuation byte. Tightened for the
    /// first continuation of E0/ED/F0/F4 leads to reject overlong forms
    /// and surrogates without waiting for the full sequence.
    lower: u8,
    upper: u8,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a multi-byte sequence is in progress.
    pub fn in_progress(&self) -> bool {
        self.remaining > 0
    }

    pub fn reset(&mut self) {
        self.remaining = 0;
    }

    pub fn decode(&mut self, byte: u8) -> Utf8Step {
        if self.remaining > 0 {
            return self.continuation(byte);
        }

        match byte {
            0x00..=0x7F => Utf8Step::Produced(byte as char),
            0xC2..=0xDF => self.start(byte & 0x1F, 1, 0x80, 0xBF),
            0xE0 => self.start(0, 2, 0xA0, 0xBF),
            0xE1..=0xEC | 0xEE..=0xEF => self.start(byte & 0x0F, 2, 0x80, 0xBF),
            0xED => self.start(0x0D, 2, 0x80, 0x9F),
            0xF0 => self.start(0, 3, 0x90, 0xBF),
            0xF1..=0xF3 => self.start(byte & 0x07, 3, 0x80, 0xBF),
            0xF4 => self.start(0x04, 3, 0x80, 0x8F),
            // 0x80..=0xC1 and 0xF5..=0xFF can never start a sequence.
            _ => Utf8Step::Invalid,
        }
    }

    fn start(&mut self, bits: u8, remaining: u8, lower: u8, upper: u8) -> Utf8Step {
        self.codepoint = bits as u32;
        self.remaining = remaining;
        self.lower = lower;
        self.upper = upper;
        Utf8Step::Pending
    }

    fn continuation(&mut self, byte: u8) -> Utf8Step {
        if byte < self.lower || byte > self.upper {
            self.remaining = 0;
            return Utf8Step::InvalidReprocess;
        }
        self.codepoint = (self.codepoint << 6) | (byte & 0x3F) as u32;
        self.lower = 0x80;
        self.upper = 0xBF;
        self.remaining -= 1;
        if self.remaining == 0 {
            match char::from_u32(self.codepoint) {
                Some(c) => Utf8Step::Produced(c),
                None => Utf8Step::Invalid,
            }
        } else {
            Utf8Step::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<char> {
        let mut decoder = Utf8Decoder::new();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match decoder.decode(bytes[i]) {
                Utf8Step::Produced(c) => {
                    out.push(c);
                    i += 1;
                }
                Utf8Step::Pending => i += 1,
                Utf8Step::Invalid => {
                    out.push('\u{FFFD}');
                    i += 1;
                }
                Utf8Step::InvalidReprocess => {
                    out.push('\u{FFFD}');
                    // byte is re-examined as a fresh lead
                }
            }
        }
        out
    }

    #[test]
    fn decodes_mixed_widths() {
        let s = "aé漢\u{1F600}";
        assert_eq!(decode_all(s.as_bytes()), s.chars().collect::<Vec<_>>());
    }

    #[test]
    fn lone_continuation_is_one_replacement() {
        assert_eq!(decode_all(&[0x80, b'x']), vec!['\u{FFFD}', 'x']);
    }

    #[test]
    fn truncated_sequence_then_ascii() {
        // E2 82 starts a 3-byte form; 'x' breaks it: one FFFD, then 'x'.
        assert_eq!(decode_all(&[0xE2, 0x82, b'x']), vec!['\u{FFFD}', 'x']);
    }

    #[test]
    fn overlong_and_surrogate_forms_rejected() {
        // Overlong "/" (C0 AF): two invalid bytes, two replacements.
        assert_eq!(decode_all(&[0xC0, 0xAF]), vec!['\u{FFFD}', '\u{FFFD}']);
        // CESU-8 surrogate ED A0 80: rejected at the first continuation.
        let out = decode_all(&[0xED, 0xA0, 0x80]);
        assert!(out.iter().all(|&c| c == '\u{FFFD}'));
    }

    #[test]
    fn max_scalar_value_accepted() {
        assert_eq!(decode_all(&[0xF4, 0x8F, 0xBF, 0xBF]), vec!['\u{10FFFF}']);
    }
}
