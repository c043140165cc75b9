use crate::extractor::{HeuristicExtractor, StructureExtractor};
use crate::language::Language;
use crate::types::Signature;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// SHA-256 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Everything the sync engine needs to know about one file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashes {
    pub content_hash: String,
    pub structure_hash: String,
    pub language: Language,

    /// `None` when extraction failed and `structure_hash` fell back to the raw content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// Content and structural hashing.
#[derive(Clone)]
pub struct HashEngine {
    extractor: Arc<dyn StructureExtractor>,
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEngine {
    pub fn new() -> Self {
        Self {
            extractor: Arc::new(HeuristicExtractor::new()),
        }
    }

    pub fn with_extractor(extractor: Arc<dyn StructureExtractor>) -> Self {
        Self { extractor }
    }

    pub fn content_hash(&self, bytes: &[u8]) -> String {
        content_hash(bytes)
    }

    /// Signature for `content`, or `None` if the extractor rejected it.
    pub fn signature(&self, content: &[u8], language_hint: &str) -> Option<Signature> {
        let language = Language::from_hint(language_hint);
        match self.extractor.extract(content, language) {
            Ok(signature) => Some(signature),
            Err(err) => {
                log::debug!("Structure extraction failed ({language_hint}): {err}");
                None
            }
        }
    }

    /// SHA-256 over the sorted, newline-joined token list. Falls back to the content hash.
    pub fn structural_hash(&self, content: &[u8], language_hint: &str) -> String {
        match self.signature(content, language_hint) {
            Some(signature) => hash_tokens(&signature),
            None => content_hash(content),
        }
    }

    pub fn hash_file(&self, content: &[u8], language_hint: &str) -> FileHashes {
        let language = Language::from_hint(language_hint);
        let signature = self.signature(content, language_hint);
        let content_hash = content_hash(content);
        let structure_hash = match &signature {
            Some(signature) => hash_tokens(signature),
            None => {
                log::debug!("Using content hash as structure hash for {language_hint}");
                content_hash.clone()
            }
        };
        FileHashes {
            content_hash,
            structure_hash,
            language,
            signature,
        }
    }
}

fn hash_tokens(signature: &Signature) -> String {
    content_hash(signature.sorted_tokens().join("\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignatureError;
    use pretty_assertions::assert_eq;

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn structural_hash_ignores_declaration_order_and_bodies() {
        let engine = HashEngine::new();
        let a = b"def alpha():\n    return 1\n\ndef beta():\n    return 2\n";
        let b = b"def beta():\n    return 20\n\n\ndef alpha():\n    pass\n";
        assert_ne!(engine.content_hash(a), engine.content_hash(b));
        assert_eq!(
            engine.structural_hash(a, "python"),
            engine.structural_hash(b, "py")
        );
    }

    #[test]
    fn structural_hash_sees_duplicates() {
        let engine = HashEngine::new();
        let once = b"fn alpha() {}\n";
        let twice = b"fn alpha() {}\nfn alpha() {}\n";
        assert_ne!(
            engine.structural_hash(once, "rs"),
            engine.structural_hash(twice, "rs")
        );
    }

    #[test]
    fn falls_back_to_content_hash() {
        struct Failing;
        impl StructureExtractor for Failing {
            fn extract(&self, _: &[u8], _: Language) -> crate::Result<Signature> {
                Err(SignatureError::other("nope"))
            }
        }

        let engine = HashEngine::with_extractor(Arc::new(Failing));
        let hashes = engine.hash_file(b"class A {}", "src/a.ts");
        assert_eq!(hashes.structure_hash, hashes.content_hash);
        assert_eq!(hashes.language, Language::TypeScript);
        assert!(hashes.signature.is_none());
    }
}
