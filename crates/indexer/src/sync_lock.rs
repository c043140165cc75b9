use crate::{Result, SyncError};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static SYNC_LOCK_WAIT_MS_LAST: AtomicU64 = AtomicU64::new(0);
static SYNC_LOCK_WAIT_MS_MAX: AtomicU64 = AtomicU64::new(0);

pub fn sync_lock_wait_ms_last() -> u64 {
    SYNC_LOCK_WAIT_MS_LAST.load(Ordering::Relaxed)
}

pub fn sync_lock_wait_ms_max() -> u64 {
    SYNC_LOCK_WAIT_MS_MAX.load(Ordering::Relaxed)
}

fn update_lock_wait_ms(wait_ms: u64) {
    SYNC_LOCK_WAIT_MS_LAST.store(wait_ms, Ordering::Relaxed);
    SYNC_LOCK_WAIT_MS_MAX.fetch_max(wait_ms, Ordering::Relaxed);
}

/// Advisory per-project lock; released on drop.
pub struct SyncLock {
    file: std::fs::File,
    path: PathBuf,
}

impl SyncLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Lock file name for a project id; anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sync_lock_path(state_dir: &Path, project_id: &str) -> PathBuf {
    let safe: String = project_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    state_dir.join(format!("sync-{safe}.lock"))
}

/// Block until this process holds the sync lock for `project_id`.
///
/// The engine does not take this lock itself; callers that may run concurrently do.
pub async fn acquire_sync_lock(state_dir: &Path, project_id: &str) -> Result<SyncLock> {
    let path = sync_lock_path(state_dir, project_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::task::spawn_blocking(move || -> Result<SyncLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| SyncError::Other(format!("open sync lock {}: {err}", path.display())))?;

        let start = Instant::now();
        file.lock_exclusive().map_err(|err| {
            SyncError::Other(format!("acquire sync lock {}: {err}", path.display()))
        })?;
        update_lock_wait_ms(start.elapsed().as_millis() as u64);
        log::debug!("Acquired sync lock {}", path.display());

        Ok(SyncLock { file, path })
    })
    .await
    .map_err(|err| SyncError::Other(format!("join sync lock task: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn lock_path_sanitizes_project_id() {
        let path = sync_lock_path(Path::new("/state"), "org/repo name");
        assert_eq!(path, PathBuf::from("/state/sync-org_repo_name.lock"));
    }

    #[tokio::test]
    async fn second_holder_waits_for_release() {
        let temp = TempDir::new().unwrap();
        let state_dir = temp.path().to_path_buf();
        let first = acquire_sync_lock(&state_dir, "p").await.unwrap();
        assert!(first.path().exists());

        let dir = state_dir.clone();
        let waiter = tokio::spawn(async move { acquire_sync_lock(&dir, "p").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_ok());
    }
}
