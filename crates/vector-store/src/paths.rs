use std::path::{Path, PathBuf};

/// Project-scoped state lives under `<root>/.context` unless configured otherwise.
pub const CONTEXT_DIR_NAME: &str = ".context";

pub const EMBEDDINGS_FILE_NAME: &str = "embeddings.json";

#[must_use]
pub fn context_dir_for_project_root(root: &Path) -> PathBuf {
    root.join(CONTEXT_DIR_NAME)
}

#[must_use]
pub fn embeddings_path(state_dir: &Path) -> PathBuf {
    state_dir.join(EMBEDDINGS_FILE_NAME)
}
