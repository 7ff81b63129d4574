//! Ignore rules for a project
//!
//! Rules come from `<root>/.codesync/ignore` plus a fixed set of safety
//! exclusions. The file is line oriented:
//!
//! ```text
//! # comment
//! build/        directory name
//! *.log         extension
//! docs/**/*.png anything else, matched with gitignore syntax
//! ```

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

use crate::domain::project::{IGNORE_FILE_NAME, PROJECT_STATE_DIR};

/// Directories that are never indexed, whatever the rule file says
pub const SAFETY_DIRS: &[&str] = &[
  ".git",
  PROJECT_STATE_DIR,
  ".idea",
  ".vscode",
  "__pycache__",
  "node_modules",
  "venv",
  ".venv",
  "env",
  "dist",
  "build",
  ".pytest_cache",
  ".mypy_cache",
  "lancedb_data",
  "target",
  "bin",
  "obj",
  ".history",
];

/// OS metadata files, compared case-insensitively
const SYSTEM_FILES: &[&str] = &["thumbs.db", ".ds_store"];

/// Written on first activation when a project has no rule file yet
pub const DEFAULT_RULES: &str = "\
# Files and directories excluded from the code index.
# Same line format as .gitignore:
#   name/    excludes a directory
#   *.ext    excludes an extension
#   other    matched as a gitignore pattern

# build output
*.egg-info/
*.pyc
*.pyo
*.pyd
*.so
*.dll
*.class
*.jar

# logs and scratch files
*.log
*.tmp
*.temp
*.swp
*.swo

# databases
*.db
*.sqlite
*.sqlite3
*.lance

# environment files
.env
.env.*
*.env
*.local

# assets
*.svg
";

/// Compiled exclusion rules for one project root
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
  dirs: HashSet<String>,
  exts: HashSet<String>,
  patterns: HashSet<String>,
  matcher: Option<Gitignore>,
}

impl IgnoreRuleSet {
  /// Rules with only the built-in exclusions
  pub fn safety_only() -> Self {
    Self {
      dirs: HashSet::new(),
      exts: HashSet::new(),
      patterns: HashSet::new(),
      matcher: None,
    }
  }

  /// Path of the rule file for `root`
  pub fn rules_path(root: &Path) -> PathBuf {
    root.join(PROJECT_STATE_DIR).join(IGNORE_FILE_NAME)
  }

  /// Whether `path` is the rule file of `root`
  pub fn is_rules_file(root: &Path, path: &Path) -> bool {
    path == Self::rules_path(root)
  }

  /// Load the rule file for `root`. A missing or unreadable file leaves only the built-in exclusions.
  pub fn load(root: &Path) -> Self {
    let path = Self::rules_path(root);
    match std::fs::read_to_string(&path) {
      Ok(content) => {
        let rules = Self::parse(root, &content);
        debug!(
          root = %root.display(),
          dirs = rules.dirs.len(),
          exts = rules.exts.len(),
          patterns = rules.patterns.len(),
          "Loaded ignore rules"
        );
        rules
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::safety_only(),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to read ignore rules, using built-in exclusions");
        Self::safety_only()
      }
    }
  }

  /// Write [`DEFAULT_RULES`] when the project has no rule file. Returns true if a file was written.
  pub fn ensure_default_file(root: &Path) -> std::io::Result<bool> {
    let path = Self::rules_path(root);
    if path.exists() {
      return Ok(false);
    }
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, DEFAULT_RULES)?;
    debug!(path = %path.display(), "Wrote default ignore rules");
    Ok(true)
  }

  /// Compile rule file content
  pub fn parse(root: &Path, content: &str) -> Self {
    let mut dirs = HashSet::new();
    let mut exts = HashSet::new();
    let mut patterns = HashSet::new();
    let mut builder = GitignoreBuilder::new(root);

    for line in content.lines() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      if let Some(dir) = line.strip_suffix('/') {
        dirs.insert(dir.to_string());
      } else if let Some(ext) = line.strip_prefix('*')
        && ext.starts_with('.')
        && !ext.contains(['*', '?', '[', '/'])
      {
        exts.insert(ext.to_string());
      } else {
        patterns.insert(line.to_string());
      }

      if let Err(e) = builder.add_line(None, line) {
        warn!(pattern = line, error = %e, "Skipping invalid ignore pattern");
      }
    }

    let matcher = match builder.build() {
      Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
      Ok(_) => None,
      Err(e) => {
        warn!(error = %e, "Failed to compile ignore patterns");
        None
      }
    };

    Self {
      dirs,
      exts,
      patterns,
      matcher,
    }
  }

  pub fn ignored_dirs(&self) -> &HashSet<String> {
    &self.dirs
  }

  pub fn ignored_extensions(&self) -> &HashSet<String> {
    &self.exts
  }

  pub fn raw_patterns(&self) -> &HashSet<String> {
    &self.patterns
  }

  /// Whether a file at root-relative `rel` (forward slashes) is excluded
  pub fn is_ignored(&self, rel: &str) -> bool {
    self.check(rel, false)
  }

  /// Whether a directory at root-relative `rel` is excluded
  pub fn is_ignored_dir(&self, rel: &str) -> bool {
    self.check(rel, true)
  }

  fn check(&self, rel: &str, is_dir: bool) -> bool {
    let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
      return false;
    };

    if parents.iter().any(|dir| self.is_excluded_dir_name(dir)) {
      return true;
    }

    if is_dir {
      if self.is_excluded_dir_name(last) {
        return true;
      }
    } else if self.is_excluded_file_name(last) {
      return true;
    }

    match &self.matcher {
      Some(matcher) => matcher.matched_path_or_any_parents(rel, is_dir).is_ignore(),
      None => false,
    }
  }

  fn is_excluded_dir_name(&self, name: &str) -> bool {
    name.starts_with('.') || SAFETY_DIRS.contains(&name) || self.dirs.contains(name)
  }

  fn is_excluded_file_name(&self, name: &str) -> bool {
    if name.starts_with('.') || is_temp_file(name) {
      return true;
    }
    let lower = name.to_lowercase();
    if SYSTEM_FILES.contains(&lower.as_str()) {
      return true;
    }
    self.exts.iter().any(|ext| name.ends_with(ext.as_str()))
  }
}

/// Editor backups, swap and lock files
fn is_temp_file(name: &str) -> bool {
  name.ends_with('~') || name.ends_with(".tmp") || name.starts_with(".#") || name.ends_with(".lock")
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  fn rules(content: &str) -> IgnoreRuleSet {
    IgnoreRuleSet::parse(Path::new("/project"), content)
  }

  #[test]
  fn test_parse_line_kinds() {
    let rules = rules("# comment\n\nlogs/\n*.pyc\nsecret.txt\n  \n");
    assert!(rules.ignored_dirs().contains("logs"));
    assert!(rules.ignored_extensions().contains(".pyc"));
    assert!(rules.raw_patterns().contains("secret.txt"));
    assert_eq!(rules.raw_patterns().len(), 1);
  }

  #[test]
  fn test_safety_dirs_always_ignored() {
    let rules = IgnoreRuleSet::safety_only();
    assert!(rules.is_ignored("node_modules/react/index.js"));
    assert!(rules.is_ignored(".git/HEAD"));
    assert!(rules.is_ignored(".codesync/ignore"));
    assert!(rules.is_ignored("app/target/debug/out.rs"));
    assert!(rules.is_ignored_dir("build"));
    assert!(!rules.is_ignored("src/main.rs"));
  }

  #[test]
  fn test_hidden_temp_and_system_files() {
    let rules = IgnoreRuleSet::safety_only();
    assert!(rules.is_ignored(".env"));
    assert!(rules.is_ignored("src/.hidden/a.py"));
    assert!(rules.is_ignored("src/main.rs~"));
    assert!(rules.is_ignored("src/.#main.rs"));
    assert!(rules.is_ignored("notes.tmp"));
    assert!(rules.is_ignored("Cargo.lock"));
    assert!(rules.is_ignored("assets/Thumbs.db"));
    assert!(rules.is_ignored(".DS_Store"));
  }

  #[test]
  fn test_project_rules() {
    let rules = rules("generated/\n*.min.js\nsecret.txt\ndocs/**/*.png\n");
    assert!(rules.is_ignored("generated/api.py"));
    assert!(rules.is_ignored("web/app.min.js"));
    assert!(rules.is_ignored("config/secret.txt"));
    assert!(rules.is_ignored("docs/img/logo.png"));
    assert!(!rules.is_ignored("web/app.js"));
    assert!(!rules.is_ignored("img/logo.png"));
  }

  #[test]
  fn test_rules_file_detection() {
    let root = Path::new("/project");
    assert!(IgnoreRuleSet::is_rules_file(root, Path::new("/project/.codesync/ignore")));
    assert!(!IgnoreRuleSet::is_rules_file(root, Path::new("/project/ignore")));
  }

  #[test]
  fn test_load_and_default_file() {
    let dir = TempDir::new().expect("temp dir");
    let empty = IgnoreRuleSet::load(dir.path());
    assert!(empty.ignored_extensions().is_empty());

    assert!(IgnoreRuleSet::ensure_default_file(dir.path()).expect("write default"));
    assert!(!IgnoreRuleSet::ensure_default_file(dir.path()).expect("second call"));

    let loaded = IgnoreRuleSet::load(dir.path());
    assert!(loaded.ignored_extensions().contains(".log"));
    assert!(loaded.is_ignored("server.log"));
  }
}
