//! Per-language heuristic scanners.
//!
//! Each scanner is a plain function over the file text. Dispatch goes through [`SCANNERS`];
//! supporting a new language means adding one function and one table row.

mod ecmascript;
mod generic;
mod go;
mod jvm;
mod python;
mod rust;

use crate::language::Language;
use crate::types::Signature;

/// A scanner turns file text into a best-effort signature. Scanners never fail.
pub type ScanFn = fn(&str, Language) -> Signature;

pub(crate) const SCANNERS: &[(Language, ScanFn)] = &[
    (Language::TypeScript, ecmascript::scan),
    (Language::JavaScript, ecmascript::scan),
    (Language::Python, python::scan),
    (Language::Rust, rust::scan),
    (Language::Go, go::scan),
    (Language::Java, jvm::scan),
    (Language::Kotlin, jvm::scan),
    (Language::CSharp, jvm::scan),
    (Language::Swift, jvm::scan),
];

pub(crate) fn builtin_scanner(language: Language) -> ScanFn {
    SCANNERS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, scan)| *scan)
        .unwrap_or(generic::scan)
}

/// Compiles a literal pattern once into a `Lazy` static.
macro_rules! regex {
    ($pattern:expr) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
            regex::Regex::new($pattern)
                .unwrap_or_else(|err| unreachable!("invalid built-in pattern: {err}"))
        });
        &*RE
    }};
}
pub(crate) use regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Class,
    Function,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    name: String,
    container: Option<String>,
    depth: usize,
}

/// Tracks `{ ... }` nesting so calls can be attributed to their enclosing class/function.
#[derive(Debug, Default)]
pub(crate) struct BraceScopes {
    depth: usize,
    stack: Vec<Scope>,
    pending: Option<(ScopeKind, String, Option<String>)>,
}

impl BraceScopes {
    /// The next `{` opens a scope for this declaration.
    pub(crate) fn open_next(&mut self, kind: ScopeKind, name: &str, container: Option<String>) {
        self.pending = Some((kind, name.to_string(), container));
    }

    pub(crate) fn current_class(&self) -> Option<String> {
        for scope in self.stack.iter().rev() {
            match scope.kind {
                ScopeKind::Class => return Some(scope.name.clone()),
                ScopeKind::Function if scope.container.is_some() => {
                    return scope.container.clone()
                }
                ScopeKind::Function => {}
            }
        }
        None
    }

    pub(crate) fn current_function(&self) -> Option<String> {
        self.stack
            .iter()
            .rev()
            .find(|s| s.kind == ScopeKind::Function)
            .map(|s| s.name.clone())
    }

    /// True when the innermost scope is a class body (method declarations live here).
    pub(crate) fn in_class_body(&self) -> bool {
        self.stack
            .last()
            .is_some_and(|s| s.kind == ScopeKind::Class)
    }

    pub(crate) fn in_function(&self) -> bool {
        self.stack.iter().any(|s| s.kind == ScopeKind::Function)
    }

    /// Consume the braces of one (comment-stripped) line.
    pub(crate) fn advance(&mut self, line: &str, quotes: &[char]) {
        let mut in_str: Option<char> = None;
        let mut escaped = false;
        for ch in line.chars() {
            if let Some(quote) = in_str {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == quote {
                    in_str = None;
                }
                continue;
            }
            if quotes.contains(&ch) {
                in_str = Some(ch);
                continue;
            }
            match ch {
                '{' => {
                    self.depth += 1;
                    if let Some((kind, name, container)) = self.pending.take() {
                        self.stack.push(Scope {
                            kind,
                            name,
                            container,
                            depth: self.depth,
                        });
                    }
                }
                '}' => {
                    while self.stack.last().is_some_and(|s| s.depth >= self.depth) {
                        self.stack.pop();
                    }
                    self.depth = self.depth.saturating_sub(1);
                }
                ';' => {
                    // Declaration without a body (trait/interface signature).
                    self.pending = None;
                }
                _ => {}
            }
        }
    }
}

/// Indentation-based scopes for Python.
#[derive(Debug, Default)]
pub(crate) struct IndentScopes {
    stack: Vec<(usize, ScopeKind, String)>,
}

impl IndentScopes {
    pub(crate) fn enter_line(&mut self, indent: usize) {
        while self.stack.last().is_some_and(|(i, _, _)| indent <= *i) {
            self.stack.pop();
        }
    }

    pub(crate) fn push(&mut self, indent: usize, kind: ScopeKind, name: &str) {
        self.stack.push((indent, kind, name.to_string()));
    }

    pub(crate) fn innermost_kind(&self) -> Option<ScopeKind> {
        self.stack.last().map(|(_, kind, _)| *kind)
    }

    pub(crate) fn current_class(&self) -> Option<String> {
        self.stack
            .iter()
            .rev()
            .find(|(_, kind, _)| *kind == ScopeKind::Class)
            .map(|(_, _, name)| name.clone())
    }

    pub(crate) fn current_function(&self) -> Option<String> {
        self.stack
            .iter()
            .rev()
            .find(|(_, kind, _)| *kind == ScopeKind::Function)
            .map(|(_, _, name)| name.clone())
    }
}

pub(crate) fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

/// Drop a trailing line comment unless the marker sits inside a string literal.
pub(crate) fn strip_line_comment<'a>(line: &'a str, marker: Option<&str>) -> &'a str {
    let Some(marker) = marker else {
        return line;
    };
    let mut search_from = 0;
    while let Some(offset) = line[search_from..].find(marker) {
        let idx = search_from + offset;
        let before = &line[..idx];
        let double = before.matches('"').count();
        let single = before.matches('\'').count();
        if double % 2 == 0 && (marker != "#" || single % 2 == 0) {
            return before;
        }
        search_from = idx + marker.len();
    }
    line
}

const CALL_KEYWORDS: &[&str] = &[
    "if", "else", "elif", "for", "foreach", "while", "switch", "match", "catch", "return",
    "function", "fn", "def", "func", "fun", "new", "sizeof", "typeof", "await", "yield",
    "lambda", "not", "and", "or", "in", "loop", "do", "try", "with", "assert", "using", "lock",
    "synchronized", "when", "class", "interface", "struct", "impl", "where", "async", "super",
    "import", "require", "print", "throw", "case", "defer", "go", "select", "unless", "until",
    "elsif", "raise", "except", "del", "instanceof", "void", "delete", "constructor", "self",
    "this", "Some", "Ok", "Err", "None",
];

pub(crate) fn is_call_keyword(name: &str) -> bool {
    CALL_KEYWORDS.contains(&name)
}

/// Candidate call expressions on a line. `skip` drops the first occurrence of a name declared on
/// the same line.
pub(crate) fn collect_calls(line: &str, skip: Option<&str>) -> Vec<String> {
    let re = regex!(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(");
    let mut skipped = skip.is_none();
    let mut out = Vec::new();
    for caps in re.captures_iter(line) {
        let Some(m) = caps.get(1) else {
            continue;
        };
        let name = m.as_str();
        if m.start() > 0 {
            let prev = line[..m.start()].chars().next_back();
            if prev.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                continue;
            }
        }
        if !skipped && Some(name) == skip {
            skipped = true;
            continue;
        }
        if is_call_keyword(name) {
            continue;
        }
        let prefix = line[..m.start()].trim_end();
        if ["fn", "def", "function", "func", "fun"]
            .iter()
            .any(|kw| prefix.ends_with(kw))
        {
            continue;
        }
        out.push(name.to_string());
    }
    out
}

/// Split a heritage list such as `Base<T>, IFoo, pkg.Bar(args)` into plain names.
pub(crate) fn split_type_list(raw: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(raw.len());
    let mut angle = 0usize;
    let mut paren = 0usize;
    for ch in raw.chars() {
        match ch {
            '<' => angle += 1,
            '>' => angle = angle.saturating_sub(1),
            '(' => paren += 1,
            ')' => paren = paren.saturating_sub(1),
            '{' if angle == 0 && paren == 0 => break,
            _ if angle == 0 && paren == 0 => cleaned.push(ch),
            _ => {}
        }
    }
    cleaned
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.split_whitespace().next())
        .map(|s| s.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_')))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Last segment of a qualified name: `React.Component` → `Component`, `std::fmt::Display` →
/// `Display`.
pub(crate) fn last_segment(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name)
}

pub(crate) fn is_upper_constant(name: &str) -> bool {
    name.len() > 1
        && name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_calls_and_skips_keywords() {
        let calls = collect_calls("if (ready) { start(x); this.stop( ) }", None);
        assert_eq!(calls, vec!["start".to_string(), "stop".to_string()]);
    }

    #[test]
    fn skips_declared_name_once() {
        let calls = collect_calls("function run() { return run(); }", Some("run"));
        assert_eq!(calls, vec!["run".to_string()]);
    }

    #[test]
    fn strips_comments_outside_strings() {
        assert_eq!(
            strip_line_comment(r#"let url = "http://x"; // note"#, Some("//")),
            r#"let url = "http://x"; "#
        );
        assert_eq!(strip_line_comment("x = 1  # set", Some("#")), "x = 1  ");
    }

    #[test]
    fn splits_heritage_lists() {
        assert_eq!(
            split_type_list("Base<T, U>, IFoo , pkg.Bar(args) {"),
            vec!["Base".to_string(), "IFoo".to_string(), "pkg.Bar".to_string()]
        );
        assert_eq!(last_segment("React.Component"), "Component");
        assert_eq!(last_segment("std::fmt::Display"), "Display");
    }

    #[test]
    fn brace_scopes_track_nesting() {
        let mut scopes = BraceScopes::default();
        scopes.open_next(ScopeKind::Class, "Service", None);
        scopes.advance("class Service {", &['"']);
        assert!(scopes.in_class_body());
        scopes.open_next(ScopeKind::Function, "run", None);
        scopes.advance("  run() { if (x) {", &['"']);
        assert_eq!(scopes.current_function().as_deref(), Some("run"));
        assert_eq!(scopes.current_class().as_deref(), Some("Service"));
        scopes.advance("  } }", &['"']);
        assert!(scopes.in_class_body());
        scopes.advance("}", &['"']);
        assert_eq!(scopes.current_class(), None);
    }
}
