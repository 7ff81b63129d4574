//! Extension → splitter language, and the syntax check run before splitting

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
  Python,
  JavaScript,
  TypeScript,
  Tsx,
  Java,
  Go,
  Rust,
  C,
  Cpp,
  Php,
  Html,
}

impl Language {
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.to_lowercase().as_str() {
      "py" => Some(Language::Python),
      "js" | "jsx" => Some(Language::JavaScript),
      "ts" => Some(Language::TypeScript),
      "tsx" => Some(Language::Tsx),
      "java" => Some(Language::Java),
      "go" => Some(Language::Go),
      "rs" => Some(Language::Rust),
      "c" | "h" => Some(Language::C),
      "cpp" | "cc" | "cxx" | "hpp" => Some(Language::Cpp),
      "php" => Some(Language::Php),
      "html" | "htm" | "css" => Some(Language::Html),
      _ => None,
    }
  }

  pub fn from_path(path: &str) -> Option<Self> {
    Path::new(path)
      .extension()
      .and_then(|ext| ext.to_str())
      .and_then(Self::from_extension)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Language::Python => "python",
      Language::JavaScript => "javascript",
      Language::TypeScript => "typescript",
      Language::Tsx => "tsx",
      Language::Java => "java",
      Language::Go => "go",
      Language::Rust => "rust",
      Language::C => "c",
      Language::Cpp => "cpp",
      Language::Php => "php",
      Language::Html => "html",
    }
  }

  /// Boundary separators, strongest first
  pub fn separators(&self) -> &'static [&'static str] {
    match self {
      Language::Python => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""],
      Language::JavaScript => &[
        "\nfunction ",
        "\nconst ",
        "\nlet ",
        "\nvar ",
        "\nclass ",
        "\nif ",
        "\nfor ",
        "\nwhile ",
        "\nswitch ",
        "\ncase ",
        "\ndefault ",
        "\n\n",
        "\n",
        " ",
        "",
      ],
      Language::TypeScript | Language::Tsx => &[
        "\nenum ",
        "\ninterface ",
        "\nnamespace ",
        "\ntype ",
        "\nclass ",
        "\nfunction ",
        "\nconst ",
        "\nlet ",
        "\nvar ",
        "\nif ",
        "\nfor ",
        "\nwhile ",
        "\nswitch ",
        "\ncase ",
        "\ndefault ",
        "\n\n",
        "\n",
        " ",
        "",
      ],
      Language::Java => &[
        "\nclass ",
        "\npublic ",
        "\nprotected ",
        "\nprivate ",
        "\nstatic ",
        "\nif ",
        "\nfor ",
        "\nwhile ",
        "\nswitch ",
        "\ncase ",
        "\n\n",
        "\n",
        " ",
        "",
      ],
      Language::Go => &[
        "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
      ],
      Language::Rust => &[
        "\nfn ", "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ", "\nmatch ", "\n\n", "\n", " ", "",
      ],
      Language::C | Language::Cpp => &[
        "\nclass ",
        "\nvoid ",
        "\nint ",
        "\nfloat ",
        "\ndouble ",
        "\nif ",
        "\nfor ",
        "\nwhile ",
        "\nswitch ",
        "\ncase ",
        "\n\n",
        "\n",
        " ",
        "",
      ],
      Language::Php => &[
        "\nfunction ",
        "\nclass ",
        "\nif ",
        "\nforeach ",
        "\nwhile ",
        "\ndo ",
        "\nswitch ",
        "\ncase ",
        "\n\n",
        "\n",
        " ",
        "",
      ],
      Language::Html => &[
        "<body", "<div", "<p", "<br", "<li", "<h1", "<h2", "<h3", "<h4", "<h5", "<h6", "<span", "<table", "<tr", "<td",
        "<th", "<ul", "<ol", "<header", "<footer", "<nav", "<head", "<style", "<script", "<meta", "<title", "",
      ],
    }
  }

  /// Whether `content` parses without syntax errors.
  ///
  /// Languages without a compiled grammar always pass.
  #[cfg(feature = "tree-sitter-tier1")]
  pub fn parses_cleanly(&self, content: &str) -> bool {
    let Some(grammar) = self.grammar() else {
      return true;
    };

    let mut parser = tree_sitter::Parser::new();
    if parser.set_language(&grammar).is_err() {
      return true;
    }

    match parser.parse(content, None) {
      Some(tree) => !tree.root_node().has_error(),
      None => false,
    }
  }

  #[cfg(not(feature = "tree-sitter-tier1"))]
  pub fn parses_cleanly(&self, _content: &str) -> bool {
    true
  }

  #[cfg(feature = "tree-sitter-tier1")]
  fn grammar(&self) -> Option<tree_sitter::Language> {
    match self {
      Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
      Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
      Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
      Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
      Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
      Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
      Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
      Language::C => Some(tree_sitter_c::LANGUAGE.into()),
      Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
      Language::Php | Language::Html => None,
    }
  }
}
