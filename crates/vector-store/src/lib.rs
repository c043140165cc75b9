//! # Context Vector Store
//!
//! Embedding index kept in sync with project files.
//!
//! ## Architecture
//!
//! ```text
//! (project, path, content)
//!     │
//!     ├──> Line windows (40 lines)
//!     │      └─> HashEmbedder → unit vectors
//!     │
//!     └──> MemoryEmbeddingIndex
//!            └─> JSON snapshot (<state_dir>/embeddings.json)
//! ```
//!
//! Callers depend on the [`EmbeddingIndex`] trait; [`NoopEmbeddingIndex`] stands in when
//! embeddings are disabled.
//!
//! ## Example
//!
//! ```no_run
//! use context_vector_store::{EmbeddingIndex, HashEmbedder, MemoryEmbeddingIndex};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let index = MemoryEmbeddingIndex::open(".context/embeddings.json", HashEmbedder::default()).await?;
//!     index.upsert("my-project", "src/main.rs", "fn main() {}").await?;
//!     index.flush().await?;
//!
//!     assert!(index.contains("my-project", "src/main.rs").await);
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod index;
pub mod paths;
mod store;
mod types;

pub use embeddings::{HashEmbedder, DEFAULT_DIMENSION};
pub use error::{Result, VectorStoreError};
pub use index::{EmbeddingIndex, NoopEmbeddingIndex};
pub use store::{MemoryEmbeddingIndex, CHUNK_LINES};
pub use types::{EmbeddedChunk, StoredEmbedding};
