use std::{
  fmt,
  path::{Component, Path, PathBuf},
};

/// Per-project state directory (config, ignore rules, index data)
pub const PROJECT_STATE_DIR: &str = ".codesync";

/// Ignore-rule file name inside [`PROJECT_STATE_DIR`]
pub const IGNORE_FILE_NAME: &str = "ignore";

/// Index data directory inside [`PROJECT_STATE_DIR`]
pub const KNOWLEDGE_DIR_NAME: &str = "knowledge";

/// Absolute, normalized project root. Keys the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectRoot(PathBuf);

impl ProjectRoot {
  /// Resolve a user-supplied path to a project root.
  ///
  /// Fails with `NotFound` when the path does not exist or is not a directory.
  pub fn resolve(path: &Path) -> std::io::Result<Self> {
    let canonical = path.canonicalize()?;
    if !canonical.is_dir() {
      return Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} is not a directory", canonical.display()),
      ));
    }
    Ok(Self(canonical))
  }

  /// Wrap a path without touching the filesystem. Lexically normalized only.
  pub fn from_normalized(path: &Path) -> Self {
    Self(normalize_lexically(path))
  }

  pub fn as_path(&self) -> &Path {
    &self.0
  }

  pub fn state_dir(&self) -> PathBuf {
    self.0.join(PROJECT_STATE_DIR)
  }

  pub fn ignore_file(&self) -> PathBuf {
    self.state_dir().join(IGNORE_FILE_NAME)
  }

  pub fn knowledge_dir(&self) -> PathBuf {
    self.state_dir().join(KNOWLEDGE_DIR_NAME)
  }
}

impl fmt::Display for ProjectRoot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.display())
  }
}

impl AsRef<Path> for ProjectRoot {
  fn as_ref(&self) -> &Path {
    &self.0
  }
}

/// Root-relative, forward-slash path for `path`, or `None` when it lies outside `root`.
///
/// Never has a leading `./`; the root itself maps to `None`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
  let rel = path.strip_prefix(root).ok()?;
  let parts: Vec<String> = rel
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect();

  if parts.is_empty() { None } else { Some(parts.join("/")) }
}

fn normalize_lexically(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn test_relative_path_forward_slashes() {
    let root = Path::new("/work/app");
    assert_eq!(
      relative_path(root, Path::new("/work/app/src/main.rs")).as_deref(),
      Some("src/main.rs")
    );
    assert_eq!(
      relative_path(root, Path::new("/work/app/./lib.rs")).as_deref(),
      Some("lib.rs")
    );
    assert_eq!(relative_path(root, Path::new("/work/app")), None);
    assert_eq!(relative_path(root, Path::new("/elsewhere/x.rs")), None);
  }

  #[test]
  fn test_resolve_missing_root_fails() {
    let dir = TempDir::new().expect("temp dir");
    let missing = dir.path().join("nope");
    assert!(ProjectRoot::resolve(&missing).is_err());
  }

  #[test]
  fn test_resolve_normalizes() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::create_dir_all(dir.path().join("a")).expect("mkdir");
    let root = ProjectRoot::resolve(&dir.path().join("a").join("..")).expect("resolve");
    assert_eq!(root.as_path(), dir.path().canonicalize().expect("canonicalize"));
  }

  #[test]
  fn test_state_paths() {
    let root = ProjectRoot::from_normalized(Path::new("/work/./app"));
    assert_eq!(root.as_path(), Path::new("/work/app"));
    assert_eq!(root.ignore_file(), PathBuf::from("/work/app/.codesync/ignore"));
    assert_eq!(root.knowledge_dir(), PathBuf::from("/work/app/.codesync/knowledge"));
  }
}
