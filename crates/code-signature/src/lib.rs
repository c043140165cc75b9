//! # Context Code Signature
//!
//! Content and structural hashing for source files.
//!
//! The content hash answers "did the bytes change?". The structural hash answers "did the
//! declarations change?" and is insensitive to declaration order and function bodies.
//!
//! ## Pipeline
//!
//! ```text
//! File bytes
//!     │
//!     ├──> SHA-256 → content hash
//!     │
//!     └──> Language (from hint) → per-language scanner
//!            ├─> tokens (class:X, function:Y, import:Z, ...) → sorted → SHA-256
//!            └─> outline (heritage clauses, call sites) for relationship extraction
//! ```
//!
//! ## Example
//!
//! ```rust
//! use context_code_signature::HashEngine;
//!
//! let engine = HashEngine::new();
//! let hashes = engine.hash_file(b"export class UserService {}", "src/user.ts");
//!
//! assert_eq!(hashes.signature.unwrap().sorted_tokens(), vec!["class:UserService"]);
//! ```

mod error;
mod extractor;
mod hash;
mod language;
mod scanners;
mod types;

pub use error::{Result, SignatureError};
pub use extractor::{HeuristicExtractor, StructureExtractor};
pub use hash::{content_hash, FileHashes, HashEngine};
pub use language::Language;
pub use scanners::ScanFn;
pub use types::{CallSite, Heritage, HeritageKind, Signature, SignatureToken, TokenKind};
