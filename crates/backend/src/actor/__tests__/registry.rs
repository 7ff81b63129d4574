#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::{
    actor::{
      ProjectRegistry, RegistryError,
      __tests__::helpers::{CountingProvider, TestProject, test_config},
    },
    context::files::IgnoreRuleSet,
    domain::config::Config,
  };

  fn registry_with(config: Config) -> (ProjectRegistry, Arc<CountingProvider>) {
    let provider = Arc::new(CountingProvider::default());
    (ProjectRegistry::new(provider.clone(), config), provider)
  }

  fn evicting_config() -> Config {
    let mut config = test_config();
    config.registry.idle_timeout_secs = 0;
    config
  }

  #[tokio::test]
  async fn test_reference_counting() {
    let project = TestProject::new();
    project.write("a.py", "a = 1\n");
    let (registry, provider) = registry_with(test_config());

    let first = registry.ensure_initialized(&project.root).await.expect("first");
    let second = registry.ensure_initialized(&project.root).await.expect("second");
    let third = registry.ensure_initialized(&project.root).await.expect("third");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(provider.opens(), 1);

    assert_eq!(registry.release(&project.root).await, Some(2));
    assert_eq!(registry.release(&project.root).await, Some(1));
    assert!(registry.get_existing(&project.root).await.is_some());

    assert_eq!(registry.release(&project.root).await, Some(0));
    // Released but not torn down until it sits idle
    assert!(registry.get_existing(&project.root).await.is_some());
    assert!(registry.sweep_idle().await.is_empty());
    assert!(!first.is_closed());

    let projects = registry.active_projects().await;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].ref_count, 0);
    assert!(projects[0].watching);

    registry.shutdown().await;
  }

  #[tokio::test]
  async fn test_missing_root_fails_activation() {
    let project = TestProject::new();
    let (registry, provider) = registry_with(test_config());

    let missing = project.path("does/not/exist");
    let Err(err) = registry.ensure_initialized(&missing).await else {
      panic!("activation of a missing root succeeded");
    };
    assert!(matches!(err, RegistryError::RootNotFound(path) if path == missing));

    let file = project.write("file.txt", "not a dir\n");
    let Err(err) = registry.ensure_initialized(&file).await else {
      panic!("activation of a file root succeeded");
    };
    assert!(matches!(err, RegistryError::RootNotFound(_)));

    assert_eq!(provider.opens(), 0);
    assert!(registry.active_projects().await.is_empty());
  }

  #[tokio::test]
  async fn test_activation_indexes_and_writes_default_rules() {
    let project = TestProject::new();
    project.write("src/main.py", "print('hi')\n");
    project.write("debug.log", "noise\n");
    let (registry, provider) = registry_with(test_config());

    let engine = registry.ensure_initialized(&project.root).await.expect("activate");
    assert!(IgnoreRuleSet::rules_path(&project.root).exists());

    let store = provider.store(&project.root);
    assert_eq!(store.chunks_for("src/main.py").await.len(), 1);
    assert!(store.chunks_for("debug.log").await.is_empty());
    assert_eq!(engine.status().await.expect("status").files, 1);

    registry.shutdown().await;
  }

  #[tokio::test]
  async fn test_existing_rules_file_is_kept() {
    let project = TestProject::new();
    project.write(".codesync/ignore", "*.txt\n");
    let (registry, _provider) = registry_with(test_config());

    registry.ensure_initialized(&project.root).await.expect("activate");
    let content = std::fs::read_to_string(IgnoreRuleSet::rules_path(&project.root)).expect("read rules");
    assert_eq!(content, "*.txt\n");

    registry.shutdown().await;
  }

  #[tokio::test]
  async fn test_concurrent_activation_of_same_root() {
    let project = TestProject::new();
    project.write("a.py", "a = 1\n");
    let (registry, provider) = registry_with(test_config());

    let (a, b) = tokio::join!(
      registry.ensure_initialized(&project.root),
      registry.ensure_initialized(&project.root)
    );
    let (a, b) = (a.expect("a"), b.expect("b"));

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(provider.opens(), 1);
    assert_eq!(registry.active_projects().await[0].ref_count, 2);

    registry.shutdown().await;
  }

  #[tokio::test]
  async fn test_snapshot_includes_busy_slots() {
    let first = TestProject::new();
    let second = TestProject::new();
    second.write("a.py", "a = 1\n");
    let (registry, _provider) = registry_with(test_config());
    registry.ensure_initialized(&first.root).await.expect("first");

    // Taken while the second root may still hold its slot for activation
    let (activated, projects) = tokio::join!(registry.ensure_initialized(&second.root), async {
      tokio::task::yield_now().await;
      registry.active_projects().await
    });
    activated.expect("second");

    assert_eq!(projects.len(), 2);
    assert!(projects.iter().all(|p| p.watching));

    registry.shutdown().await;
  }

  #[tokio::test]
  async fn test_idle_sweep_evicts_regardless_of_references() {
    let project = TestProject::new();
    project.write("a.py", "a = 1\n");
    let (registry, provider) = registry_with(evicting_config());

    let engine = registry.ensure_initialized(&project.root).await.expect("activate");
    let evicted = registry.sweep_idle().await;

    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].as_path(), project.root.as_path());
    assert!(engine.is_closed());
    assert!(registry.get_existing(&project.root).await.is_none());
    assert!(registry.active_projects().await.is_empty());
    assert_eq!(registry.release(&project.root).await, None);

    // Reactivation builds a fresh context
    let again = registry.ensure_initialized(&project.root).await.expect("reactivate");
    assert!(!Arc::ptr_eq(&engine, &again));
    assert!(!again.is_closed());
    assert_eq!(provider.opens(), 2);

    registry.shutdown().await;
  }

  #[tokio::test]
  async fn test_sweep_runs_opportunistically_on_access() {
    let first = TestProject::new();
    let second = TestProject::new();
    let mut config = evicting_config();
    config.registry.sweep_interval_secs = 0;
    let (registry, _provider) = registry_with(config);

    let engine = registry.ensure_initialized(&first.root).await.expect("first");
    registry.ensure_initialized(&second.root).await.expect("second");

    assert!(engine.is_closed());
    let active = registry.active_projects().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].root, second.root);

    registry.shutdown().await;
  }

  #[tokio::test]
  async fn test_shutdown_evicts_everything() {
    let first = TestProject::new();
    let second = TestProject::new();
    let (registry, _provider) = registry_with(test_config());

    let a = registry.ensure_initialized(&first.root).await.expect("first");
    let b = registry.ensure_initialized(&second.root).await.expect("second");
    assert_eq!(registry.active_projects().await.len(), 2);

    registry.shutdown().await;
    assert!(a.is_closed());
    assert!(b.is_closed());
    assert!(registry.active_projects().await.is_empty());
  }

  #[tokio::test]
  async fn test_release_of_unknown_project() {
    let project = TestProject::new();
    let (registry, _provider) = registry_with(test_config());
    assert_eq!(registry.release(&project.root).await, None);
    assert!(registry.get_existing(&project.root).await.is_none());
  }
}
