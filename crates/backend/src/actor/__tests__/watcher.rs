#[cfg(test)]
mod tests {
  use std::time::Duration;

  use filetime::FileTime;
  use tokio::time::sleep;

  use crate::{
    actor::{
      FileSystemWatcher, upsert_if_changed,
      __tests__::helpers::{TEST_COOLDOWN_MS, TestProject, engine_for, test_config, wait_for},
    },
    context::files::{ContentHasher, IgnoreRuleSet},
    service::code::UpsertOutcome,
  };

  /// Long enough for the cooldown, the settle delay and a slow CI box
  const WAIT: Duration = Duration::from_secs(5);

  fn quiet_period() -> Duration {
    Duration::from_millis(TEST_COOLDOWN_MS * 4)
  }

  #[tokio::test]
  async fn test_watcher_indexes_created_and_modified_files() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    project.write("src/lib.rs", "pub fn one() -> u32 { 1 }\n");
    let expected = ContentHasher::hash("pub fn one() -> u32 { 1 }\n");
    let indexed = wait_for(WAIT, || async {
      engine.stored_hash("src/lib.rs").await.ok().flatten().as_deref() == Some(expected.as_str())
    })
    .await;
    assert!(indexed, "created file was not indexed");

    sleep(quiet_period()).await;
    project.write("src/lib.rs", "pub fn two() -> u32 { 2 }\n");
    let expected = ContentHasher::hash("pub fn two() -> u32 { 2 }\n");
    let updated = wait_for(WAIT, || async {
      engine.stored_hash("src/lib.rs").await.ok().flatten().as_deref() == Some(expected.as_str())
    })
    .await;
    assert!(updated, "modified file was not reindexed");
    assert_eq!(store.chunks_for("src/lib.rs").await.len(), 1);

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_watcher_removes_deleted_files() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    project.write("a.py", "a = 1\n");
    project.write("b.py", "b = 2\n");
    engine.sync_project().await.expect("initial sync");

    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;
    project.remove("b.py");

    let removed = wait_for(WAIT, || async { store.chunks_for("b.py").await.is_empty() }).await;
    assert!(removed, "deleted file still indexed");
    assert_eq!(store.chunks_for("a.py").await.len(), 1);

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_touch_without_content_change_skips_upsert() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    let path = project.write("a.py", "a = 1\n");
    engine.sync_project().await.expect("initial sync");
    assert_eq!(store.upserts_for("a.py"), 1);

    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    filetime::set_file_mtime(&path, FileTime::now()).expect("touch");
    // Rewriting identical content is a no-op too
    project.write("a.py", "a = 1\n");
    sleep(quiet_period()).await;

    assert_eq!(store.upserts_for("a.py"), 1);
    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_rules_reload_drops_newly_ignored_files() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    IgnoreRuleSet::ensure_default_file(&project.root).expect("rules");
    project.write("README.md", "# title\n");
    project.write("main.py", "print('hi')\n");
    engine.sync_project().await.expect("initial sync");
    assert_eq!(store.chunks_for("README.md").await.len(), 1);

    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    project.write(".codesync/ignore", "*.md\n");
    let dropped = wait_for(WAIT, || async { store.chunks_for("README.md").await.is_empty() }).await;
    assert!(dropped, "newly ignored file still indexed");
    assert_eq!(store.chunks_for("main.py").await.len(), 1);
    // The rule file itself is never indexed
    assert!(store.chunks_for(".codesync/ignore").await.is_empty());

    // Later events for ignored files are filtered
    sleep(quiet_period()).await;
    project.write("CHANGELOG.md", "## 1.0\n");
    sleep(quiet_period()).await;
    assert!(store.chunks_for("CHANGELOG.md").await.is_empty());

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_move_into_ignored_path_only_deletes() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    IgnoreRuleSet::ensure_default_file(&project.root).expect("rules");
    project.write("notes.txt", "remember this\n");
    engine.sync_project().await.expect("initial sync");

    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    std::fs::rename(project.path("notes.txt"), project.path("notes.log")).expect("rename");
    let removed = wait_for(WAIT, || async { store.chunks_for("notes.txt").await.is_empty() }).await;
    assert!(removed);
    assert!(store.chunks_for("notes.log").await.is_empty());
    assert_eq!(store.upserts_for("notes.log"), 0);

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_move_from_ignored_path_only_inserts() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    IgnoreRuleSet::ensure_default_file(&project.root).expect("rules");
    project.write("draft.log", "almost ready\n");
    engine.sync_project().await.expect("initial sync");

    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    std::fs::rename(project.path("draft.log"), project.path("final.txt")).expect("rename");
    let inserted = wait_for(WAIT, || async { store.chunks_for("final.txt").await.len() == 1 }).await;
    assert!(inserted);
    assert_eq!(store.deletes_for("draft.log"), 0);

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_directory_moved_into_root_is_indexed() {
    let project = TestProject::new();
    let outside = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    outside.write("pkg/mod.py", "def run():\n    return 1\n");
    outside.write("pkg/sub/util.py", "def helper():\n    return 2\n");
    engine.sync_project().await.expect("initial sync");

    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    std::fs::rename(outside.path("pkg"), project.path("pkg")).expect("move in");
    let indexed = wait_for(WAIT, || async {
      store.chunks_for("pkg/mod.py").await.len() == 1 && store.chunks_for("pkg/sub/util.py").await.len() == 1
    })
    .await;
    assert!(indexed, "files of the moved-in directory were not indexed");

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_directory_moved_out_of_root_is_removed() {
    let project = TestProject::new();
    let outside = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    project.write("pkg/mod.py", "def run():\n    return 1\n");
    project.write("pkg/sub/util.py", "def helper():\n    return 2\n");
    project.write("main.py", "import pkg\n");
    engine.sync_project().await.expect("initial sync");
    assert_eq!(store.chunks_for("pkg/mod.py").await.len(), 1);

    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    std::fs::rename(project.path("pkg"), outside.path("pkg")).expect("move out");
    let removed = wait_for(WAIT, || async {
      store.chunks_for("pkg/mod.py").await.is_empty() && store.chunks_for("pkg/sub/util.py").await.is_empty()
    })
    .await;
    assert!(removed, "chunks of the moved-out directory survived");
    assert_eq!(store.chunks_for("main.py").await.len(), 1);

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_files_in_new_directory_are_indexed() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    // Written together with their directories, before the watch can reach them
    project.write("lib/deep/nested/a.py", "a = 1\n");
    project.write("lib/deep/nested/b.py", "b = 2\n");
    let indexed = wait_for(WAIT, || async {
      store.chunks_for("lib/deep/nested/a.py").await.len() == 1
        && store.chunks_for("lib/deep/nested/b.py").await.len() == 1
    })
    .await;
    assert!(indexed, "files in a new directory were not indexed");

    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_stop_halts_indexing() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    assert!(watcher.is_running());

    watcher.stop().await;
    assert!(!watcher.is_running());
    // Stopping twice is harmless
    watcher.stop().await;

    project.write("late.py", "late = True\n");
    sleep(quiet_period()).await;
    assert!(store.chunks_for("late.py").await.is_empty());
  }

  #[tokio::test]
  async fn test_closed_engine_drops_in_flight_work() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    let watcher = FileSystemWatcher::start(engine.clone(), &config.watcher).expect("start watcher");
    sleep(Duration::from_millis(100)).await;

    // Dispatched, but the worker settles before reading and finds the engine closed
    project.write("a.py", "a = 1\n");
    sleep(Duration::from_millis(TEST_COOLDOWN_MS / 4)).await;
    engine.close();

    sleep(quiet_period()).await;
    assert!(store.chunks_for("a.py").await.is_empty());
    watcher.stop().await;
  }

  #[tokio::test]
  async fn test_upsert_if_changed_gates_on_fingerprint() {
    let project = TestProject::new();
    let config = test_config();
    let (engine, store) = engine_for(&project, &config.index);
    let path = project.write("a.py", "a = 1\n");

    let first = upsert_if_changed(&engine, &path).await.expect("first");
    assert_eq!(first, Some(UpsertOutcome::Indexed { chunks: 1 }));

    // CRLF rewrite of the same text hashes the same
    project.write("a.py", "a = 1\r\n");
    let second = upsert_if_changed(&engine, &path).await.expect("second");
    assert_eq!(second, None);
    assert_eq!(store.upserts_for("a.py"), 1);

    // A never-indexed blank file needs no write
    let blank = project.write("blank.py", "\n\n");
    assert_eq!(upsert_if_changed(&engine, &blank).await.expect("blank"), None);
    assert_eq!(store.deletes_for("blank.py"), 0);

    project.remove("a.py");
    let gone = upsert_if_changed(&engine, &path).await.expect("gone");
    assert_eq!(gone, Some(UpsertOutcome::Removed));
    assert!(store.chunks_for("a.py").await.is_empty());
  }
}
