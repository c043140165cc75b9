use crate::error::{Result, SignatureError};
use crate::language::Language;
use crate::scanners::{builtin_scanner, ScanFn};
use crate::types::Signature;
use std::collections::HashMap;

/// Produces the structural signature of a file.
///
/// Implementations must be deterministic for the same bytes. An error makes the
/// [`HashEngine`](crate::HashEngine) fall back to hashing raw content.
pub trait StructureExtractor: Send + Sync {
    fn extract(&self, content: &[u8], language: Language) -> Result<Signature>;
}

/// Regex/line-based extractor with a per-language dispatch table.
#[derive(Default)]
pub struct HeuristicExtractor {
    overrides: HashMap<Language, ScanFn>,
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the scanner for a language.
    #[must_use]
    pub fn with_scanner(mut self, language: Language, scan: ScanFn) -> Self {
        self.overrides.insert(language, scan);
        self
    }

    fn scanner_for(&self, language: Language) -> ScanFn {
        self.overrides
            .get(&language)
            .copied()
            .unwrap_or_else(|| builtin_scanner(language))
    }
}

impl StructureExtractor for HeuristicExtractor {
    fn extract(&self, content: &[u8], language: Language) -> Result<Signature> {
        if content.contains(&0) {
            return Err(SignatureError::Binary(content.len()));
        }
        let text = std::str::from_utf8(content)?;
        Ok((self.scanner_for(language))(text, language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SignatureToken, TokenKind};

    #[test]
    fn rejects_binary_and_invalid_utf8() {
        let extractor = HeuristicExtractor::new();
        assert!(matches!(
            extractor.extract(b"\x00\x01\x02", Language::Rust),
            Err(SignatureError::Binary(3))
        ));
        assert!(matches!(
            extractor.extract(&[0xff, 0xfe, b'a'], Language::Rust),
            Err(SignatureError::NotUtf8(_))
        ));
    }

    #[test]
    fn overrides_take_precedence() {
        fn everything_is_a_class(text: &str, language: Language) -> Signature {
            let mut sig = Signature::empty(language);
            for (idx, line) in text.lines().enumerate() {
                sig.tokens
                    .push(SignatureToken::new(TokenKind::Class, line.trim(), idx + 1));
            }
            sig
        }

        let extractor =
            HeuristicExtractor::new().with_scanner(Language::Ruby, everything_is_a_class);
        let sig = extractor
            .extract(b"alpha\nbeta", Language::Ruby)
            .expect("extract");
        assert_eq!(sig.sorted_tokens(), vec!["class:alpha", "class:beta"]);
    }
}
