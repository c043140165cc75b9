use crate::language::Language;
use serde::{Deserialize, Serialize};

/// Kind of a structural token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Class,
    Function,
    Method,
    Interface,
    Enum,
    Constant,
    Import,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Class => "class",
            TokenKind::Function => "function",
            TokenKind::Method => "method",
            TokenKind::Interface => "interface",
            TokenKind::Enum => "enum",
            TokenKind::Constant => "constant",
            TokenKind::Import => "import",
        }
    }

    /// Declarations become `DEFINES` targets; imports do not.
    pub fn is_declaration(self) -> bool {
        !matches!(self, TokenKind::Import)
    }

    /// Kinds that other files can extend or implement.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            TokenKind::Class | TokenKind::Interface | TokenKind::Enum
        )
    }
}

/// Symbol-level token emitted by an extractor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureToken {
    pub kind: TokenKind,

    /// Declared name, or the import target for [`TokenKind::Import`]
    pub name: String,

    /// Enclosing class/impl for methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// 1-indexed line of the declaration
    pub line: usize,
}

impl SignatureToken {
    pub fn new(kind: TokenKind, name: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            name: name.into(),
            container: None,
            line,
        }
    }

    #[must_use]
    pub fn in_container(mut self, container: Option<String>) -> Self {
        self.container = container;
        self
    }

    /// Hashable form, e.g. `class:UserService`.
    pub fn render(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeritageKind {
    Extends,
    Implements,
}

/// `child extends parent` / `child implements parent`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Heritage {
    pub child: String,
    pub parent: String,
    pub kind: HeritageKind,
}

/// A call-like expression found in the file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: String,

    /// Innermost enclosing function or method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,

    /// Innermost enclosing class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    pub line: usize,
}

/// Structural signature of one file.
///
/// Only `tokens` take part in the structural hash; `heritage` and `calls` are an outline used
/// for relationship extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub language: Language,
    pub tokens: Vec<SignatureToken>,
    #[serde(default)]
    pub heritage: Vec<Heritage>,
    #[serde(default)]
    pub calls: Vec<CallSite>,
}

impl Signature {
    pub fn empty(language: Language) -> Self {
        Self {
            language,
            tokens: Vec::new(),
            heritage: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Sorted rendered tokens; the input of the structural hash.
    pub fn sorted_tokens(&self) -> Vec<String> {
        let mut out: Vec<String> = self.tokens.iter().map(SignatureToken::render).collect();
        out.sort();
        out
    }

    pub fn declarations(&self) -> impl Iterator<Item = &SignatureToken> {
        self.tokens.iter().filter(|t| t.kind.is_declaration())
    }

    pub fn imports(&self) -> impl Iterator<Item = &SignatureToken> {
        self.tokens.iter().filter(|t| t.kind == TokenKind::Import)
    }

    pub(crate) fn push(&mut self, token: SignatureToken) {
        self.tokens.push(token);
    }

    pub(crate) fn push_heritage(&mut self, child: &str, parent: &str, kind: HeritageKind) {
        let parent = parent.trim();
        if parent.is_empty() || child.is_empty() {
            return;
        }
        self.heritage.push(Heritage {
            child: child.to_string(),
            parent: parent.to_string(),
            kind,
        });
    }
}
