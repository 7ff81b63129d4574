//! End to end: activation, an in-place edit and a delete on a two-file project.

#[cfg(test)]
mod tests {
  use std::{collections::HashSet, sync::Arc, time::Duration};

  use tokio::time::sleep;

  use crate::{
    actor::{
      ProjectRegistry,
      __tests__::helpers::{CountingProvider, TEST_COOLDOWN_MS, TestProject, test_config, wait_for},
    },
    context::files::ContentHasher,
  };

  fn python_source(target_len: usize) -> String {
    let mut out = String::new();
    let mut i = 0;
    while out.len() < target_len {
      out.push_str(&format!("def handler_{i}(value):\n    return value + {i}\n\n\n"));
      i += 1;
    }
    out
  }

  #[tokio::test]
  async fn test_two_file_project_lifecycle() {
    let project = TestProject::new();
    let small = python_source(500);
    let large = python_source(40_000);
    project.write("a.py", &small);
    project.write("b.py", &large);

    let mut config = test_config();
    config.index.small_file_threshold = 30_000;
    let provider = Arc::new(CountingProvider::default());
    let registry = ProjectRegistry::new(provider.clone(), config);

    registry.ensure_initialized(&project.root).await.expect("activate");
    let store = provider.store(&project.root);

    let a_chunks = store.chunks_for("a.py").await;
    assert_eq!(a_chunks.len(), 1);
    assert!(a_chunks[0].metadata.is_whole_file);

    let b_chunks = store.chunks_for("b.py").await;
    assert!(b_chunks.len() >= 2, "expected b.py to be split, got {}", b_chunks.len());
    let b_hashes: HashSet<&str> = b_chunks.iter().map(|c| c.metadata.hash.as_str()).collect();
    assert_eq!(b_hashes.len(), 1);
    assert!(b_hashes.contains(ContentHasher::hash(&large).as_str()));

    // Let the watcher settle before editing
    sleep(Duration::from_millis(100)).await;
    let upserts_before = store.upserts_for("a.py");
    let edited = format!("{small}\ndef added():\n    return 42\n");
    project.write("a.py", &edited);

    let expected = ContentHasher::hash(&edited);
    let reindexed = wait_for(Duration::from_secs(5), || async {
      store
        .chunks_for("a.py")
        .await
        .first()
        .is_some_and(|c| c.metadata.hash == expected)
    })
    .await;
    assert!(reindexed, "edit to a.py was not picked up");

    // Anything else inside the window would have been debounced
    sleep(Duration::from_millis(TEST_COOLDOWN_MS * 4)).await;
    assert_eq!(store.upserts_for("a.py"), upserts_before + 1);
    assert_eq!(store.chunks_for("a.py").await.len(), 1);

    project.remove("b.py");
    let removed = wait_for(Duration::from_secs(5), || async { store.chunks_for("b.py").await.is_empty() }).await;
    assert!(removed, "b.py chunks survived its deletion");
    assert_eq!(store.chunks_for("a.py").await.len(), 1);

    registry.shutdown().await;
  }
}
