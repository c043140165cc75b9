use serde::{Deserialize, Serialize};

/// One embedded window of a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub start_line: usize,
    pub end_line: usize,
    pub vector: Vec<f32>,
}

/// All vectors derived from one file's current content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub path: String,
    pub chunks: Vec<EmbeddedChunk>,
}
