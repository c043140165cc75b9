use serde::{Deserialize, Serialize};
use std::path::Path;

/// Language detected for a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Kotlin,
    CSharp,
    Swift,
    C,
    Cpp,
    Ruby,
    Unknown,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "kt" | "kts" => Language::Kotlin,
            "cs" => Language::CSharp,
            "swift" => Language::Swift,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "rb" => Language::Ruby,
            _ => Language::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Resolve a caller-provided hint: a language name, an extension or a file path.
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.trim();
        let by_name = match hint.to_lowercase().as_str() {
            "rust" => Some(Language::Rust),
            "python" => Some(Language::Python),
            "javascript" => Some(Language::JavaScript),
            "typescript" => Some(Language::TypeScript),
            "go" | "golang" => Some(Language::Go),
            "java" => Some(Language::Java),
            "kotlin" => Some(Language::Kotlin),
            "csharp" | "c#" => Some(Language::CSharp),
            "swift" => Some(Language::Swift),
            "cpp" | "c++" => Some(Language::Cpp),
            "ruby" => Some(Language::Ruby),
            _ => None,
        };
        if let Some(lang) = by_name {
            return lang;
        }
        if hint.contains('.') || hint.contains('/') {
            return Self::from_path(hint);
        }
        Self::from_extension(hint)
    }

    /// Get language name as string
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::CSharp => "csharp",
            Language::Swift => "swift",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Unknown => "unknown",
        }
    }

    /// Line comment prefix used to strip trailing comments before scanning
    pub(crate) fn line_comment(self) -> Option<&'static str> {
        match self {
            Language::Python | Language::Ruby => Some("#"),
            Language::Unknown => None,
            _ => Some("//"),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("RS"), Language::Rust);
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("unknown"), Language::Unknown);
    }

    #[test]
    fn test_from_hint() {
        assert_eq!(Language::from_hint("typescript"), Language::TypeScript);
        assert_eq!(Language::from_hint("src/a.ts"), Language::TypeScript);
        assert_eq!(Language::from_hint("go"), Language::Go);
        assert_eq!(Language::from_hint("kt"), Language::Kotlin);
        assert_eq!(Language::from_hint("Makefile"), Language::Unknown);
    }
}
