use clap::ValueEnum;
use context_indexer::{HashStoreBackend, SyncMode};

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum BackendFlag {
    Memory,
    Sqlite,
}

impl BackendFlag {
    pub(crate) const fn as_domain(self) -> HashStoreBackend {
        match self {
            BackendFlag::Memory => HashStoreBackend::Memory,
            BackendFlag::Sqlite => HashStoreBackend::Sqlite,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum ModeFlag {
    Full,
    Incremental,
    Selective,
}

impl ModeFlag {
    pub(crate) const fn as_domain(self) -> SyncMode {
        match self {
            ModeFlag::Full => SyncMode::Full,
            ModeFlag::Incremental => SyncMode::Incremental,
            ModeFlag::Selective => SyncMode::Selective,
        }
    }
}
