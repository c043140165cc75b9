use context_indexer::{
    Collaborators, HashStore, HashStoreBackend, SyncConfig, SyncManager, SyncMode, SyncOptions,
    SyncOutcome, SyncReason, LOCAL_CACHE_FILE_NAME,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

fn config(state_dir: &Path) -> SyncConfig {
    SyncConfig {
        backend: HashStoreBackend::Sqlite,
        state_dir: Some(state_dir.to_path_buf()),
        store_content: true,
        ..SyncConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_state_survives_reopen() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path().join("project");
    let state_dir = temp.path().join("state");
    tokio::fs::create_dir_all(root.join("src")).await.expect("mkdir");
    tokio::fs::write(root.join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n")
        .await
        .expect("write lib.rs");
    tokio::fs::write(root.join("README.md"), "# Demo\n")
        .await
        .expect("write README.md");

    let manager = SyncManager::open(&root, config(&state_dir), Collaborators::noop())
        .await
        .expect("open manager");
    let first = manager
        .sync_project("demo", &root, &SyncOptions::default())
        .await
        .expect("first sync");
    assert_eq!(first.outcome, SyncOutcome::Completed);
    assert_eq!(first.strategy_used, SyncMode::Full);
    assert_eq!(first.new_files, 2);
    manager.close().await.expect("close");
    drop(manager);
    assert!(state_dir.join(LOCAL_CACHE_FILE_NAME).exists());

    let reopened = SyncManager::open(&root, config(&state_dir), Collaborators::noop())
        .await
        .expect("reopen manager");
    let status = reopened.status("demo").await.expect("status");
    assert_eq!(status.tracked_files, 2);
    assert_eq!(status.incomplete, 0);
    assert_eq!(status.local_cache_entries, Some(2));
    assert_eq!(
        status.metadata.map(|m| (m.strategy_used, m.files_processed)),
        Some((SyncMode::Full, 2))
    );

    let content = reopened
        .store()
        .get_content("demo", "src/lib.rs")
        .await
        .expect("get content");
    assert_eq!(content.as_deref(), Some(&b"pub fn answer() -> u32 { 42 }\n"[..]));

    let rerun = reopened
        .sync_project("demo", &root, &SyncOptions::default())
        .await
        .expect("second sync");
    assert_eq!(rerun.outcome, SyncOutcome::Skipped);
    assert_eq!(rerun.reason, SyncReason::Unchanged);

    tokio::fs::remove_file(root.join("README.md"))
        .await
        .expect("remove README.md");
    let deleted = reopened
        .sync_project("demo", &root, &SyncOptions::default())
        .await
        .expect("third sync");
    assert_eq!(deleted.reason, SyncReason::Deleted);
    assert_eq!(deleted.cleaned_up, 1);
    assert!(reopened
        .store()
        .get("demo", "README.md")
        .await
        .expect("get record")
        .is_none());
    reopened.close().await.expect("close");
}

#[tokio::test]
async fn projects_share_one_database_without_overlap() {
    let temp = TempDir::new().expect("tempdir");
    let state_dir = temp.path().join("state");
    let (one, two) = (temp.path().join("one"), temp.path().join("two"));
    for root in [&one, &two] {
        tokio::fs::create_dir_all(root).await.expect("mkdir");
        tokio::fs::write(root.join("main.py"), "def main():\n    pass\n")
            .await
            .expect("write main.py");
    }
    tokio::fs::write(two.join("util.py"), "def helper():\n    return 1\n")
        .await
        .expect("write util.py");

    let manager = SyncManager::open(&one, config(&state_dir), Collaborators::noop())
        .await
        .expect("open manager");
    manager
        .sync_project("one", &one, &SyncOptions::default())
        .await
        .expect("sync one");
    manager
        .sync_project("two", &two, &SyncOptions::default())
        .await
        .expect("sync two");

    assert_eq!(manager.status("one").await.unwrap().tracked_files, 1);
    assert_eq!(manager.status("two").await.unwrap().tracked_files, 2);
    manager.close().await.expect("close");
}
