use super::{
    collect_calls, regex, split_type_list, strip_line_comment, BraceScopes, ScopeKind,
};
use crate::language::Language;
use crate::types::{CallSite, HeritageKind, Signature, SignatureToken, TokenKind};

// Single quotes are lifetimes as often as char literals.
const QUOTES: &[char] = &['"'];

pub(super) fn scan(content: &str, language: Language) -> Signature {
    let mut sig = Signature::empty(language);
    let mut scopes = BraceScopes::default();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_line_comment(raw, language.line_comment());
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("#[") || trimmed.starts_with("//") {
            continue;
        }

        if let Some(caps) = regex!(r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?use\s+([^;{]+?)(?:::\{|;|$)")
            .captures(line)
        {
            sig.push(SignatureToken::new(
                TokenKind::Import,
                caps[1].trim().trim_end_matches("::"),
                line_no,
            ));
            continue;
        }
        if let Some(caps) =
            regex!(r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?mod\s+([A-Za-z_]\w*)\s*;").captures(line)
        {
            sig.push(SignatureToken::new(
                TokenKind::Import,
                format!("self::{}", &caps[1]),
                line_no,
            ));
            continue;
        }

        let mut declared: Option<String> = None;
        let mut declared_fn: Option<String> = None;

        if let Some(caps) =
            regex!(r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:struct|union)\s+([A-Za-z_]\w*)")
                .captures(line)
        {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Class, &name, line_no));
            declared = Some(name);
        } else if let Some(caps) =
            regex!(r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?enum\s+([A-Za-z_]\w*)").captures(line)
        {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Enum, &name, line_no));
            declared = Some(name);
        } else if let Some(caps) = regex!(
            r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:unsafe\s+)?trait\s+([A-Za-z_]\w*)(?:\s*<[^>]*>)?(?:\s*:\s*([^{]+))?"
        )
        .captures(line)
        {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Interface, &name, line_no));
            if let Some(bounds) = caps.get(2) {
                let bounds = bounds.as_str().split(" where ").next().unwrap_or_default();
                for parent in bounds
                    .split('+')
                    .filter(|b| !b.trim_start().starts_with('\''))
                    .flat_map(split_type_list)
                {
                    sig.push_heritage(&name, &parent, HeritageKind::Extends);
                }
            }
            scopes.open_next(ScopeKind::Class, &name, None);
            declared = Some(name);
        } else if let Some(caps) = regex!(
            r"^\s*(?:unsafe\s+)?impl(?:\s*<[^{]*?>)?\s+(?:!?([\w:]+)(?:<[^{]*?>)?\s+for\s+)?&?(?:mut\s+)?([\w:]+)"
        )
        .captures(line)
        {
            let target = super::last_segment(&caps[2]).to_string();
            if let Some(trait_name) = caps.get(1) {
                sig.push_heritage(&target, trait_name.as_str(), HeritageKind::Implements);
            }
            scopes.open_next(ScopeKind::Class, &target, None);
        } else if let Some(caps) = regex!(
            r#"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#
        )
        .captures(line)
        {
            let name = caps[1].to_string();
            if scopes.in_class_body() {
                let class = scopes.current_class();
                sig.push(SignatureToken::new(TokenKind::Method, &name, line_no).in_container(class));
            } else if !scopes.in_function() {
                sig.push(SignatureToken::new(TokenKind::Function, &name, line_no));
            }
            scopes.open_next(ScopeKind::Function, &name, None);
            declared_fn = Some(name.clone());
            declared = Some(name);
        } else if let Some(caps) =
            regex!(r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:const|static(?:\s+mut)?)\s+([A-Za-z_]\w*)\s*:")
                .captures(line)
        {
            if !scopes.in_function() {
                sig.push(SignatureToken::new(TokenKind::Constant, &caps[1], line_no));
            }
        }

        let caller = declared_fn.or_else(|| scopes.current_function());
        let class = scopes.current_class();
        for callee in collect_calls(line, declared.as_deref()) {
            sig.calls.push(CallSite {
                callee,
                caller: caller.clone(),
                class: class.clone(),
                line: line_no,
            });
        }

        scopes.advance(line, QUOTES);
    }

    sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"
use std::collections::HashMap;
use crate::store::{Store, Key};
mod helpers;

pub const LIMIT: usize = 8;

pub trait Backend: Send + Sync {
    fn put(&self, key: &str);
}

pub struct Memory<'a> {
    items: HashMap<&'a str, u32>,
}

impl<'a> Backend for Memory<'a> {
    fn put(&self, key: &str) {
        self.record(key);
    }
}

impl Memory<'_> {
    pub fn record(&self, key: &str) {
        helpers::log(key);
    }
}

pub(crate) fn run() -> Result<(), Error> {
    let m = Memory::default();
    m.put("x");
    Ok(())
}
"#;

    #[test]
    fn extracts_rust_tokens() {
        let sig = scan(SOURCE, Language::Rust);
        assert_eq!(
            sig.sorted_tokens(),
            vec![
                "class:Memory",
                "constant:LIMIT",
                "function:run",
                "import:crate::store",
                "import:self::helpers",
                "import:std::collections::HashMap",
                "interface:Backend",
                "method:put",
                "method:put",
                "method:record",
            ]
        );
    }

    #[test]
    fn impl_blocks_become_heritage_and_containers() {
        let sig = scan(SOURCE, Language::Rust);
        let pairs: Vec<(&str, &str, HeritageKind)> = sig
            .heritage
            .iter()
            .map(|h| (h.child.as_str(), h.parent.as_str(), h.kind))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Backend", "Send", HeritageKind::Extends),
                ("Backend", "Sync", HeritageKind::Extends),
                ("Memory", "Backend", HeritageKind::Implements),
            ]
        );
        let record = sig.tokens.iter().find(|t| t.name == "record").expect("record");
        assert_eq!(record.container.as_deref(), Some("Memory"));
    }

    #[test]
    fn calls_resolve_their_enclosing_impl() {
        let sig = scan(SOURCE, Language::Rust);
        let record = sig.calls.iter().find(|c| c.callee == "record").expect("call");
        assert_eq!(record.caller.as_deref(), Some("put"));
        assert_eq!(record.class.as_deref(), Some("Memory"));
    }
}
