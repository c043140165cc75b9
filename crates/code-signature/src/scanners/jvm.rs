//! Java, Kotlin, C# and Swift share enough declaration shape for one scanner.

use super::{
    collect_calls, is_call_keyword, regex, split_type_list, strip_line_comment, BraceScopes,
    ScopeKind,
};
use crate::language::Language;
use crate::types::{CallSite, HeritageKind, Signature, SignatureToken, TokenKind};
use once_cell::sync::Lazy;
use regex::Regex;

const QUOTES: &[char] = &['"', '\''];

const MODIFIERS: &str = r"(?:(?:public|private|protected|internal|static|final|abstract|sealed|open|override|data|inner|partial|readonly|virtual|async|synchronized|native|default|fileprivate|extension|unsafe|new|suspend|inline|operator|infix|lateinit|const|mutating|@\w+(?:\([^)]*\))?)\s+)*";

pub(super) fn scan(content: &str, language: Language) -> Signature {
    let mut sig = Signature::empty(language);
    let mut scopes = BraceScopes::default();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_line_comment(raw, language.line_comment());
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('*')
            || trimmed.starts_with("/*")
            || (trimmed.starts_with('@') && !trimmed.contains(' '))
        {
            continue;
        }

        if let Some(caps) =
            regex!(r"^\s*(?:import|using)\s+(?:static\s+)?([\w.*]+)\s*;?\s*$").captures(line)
        {
            sig.push(SignatureToken::new(TokenKind::Import, &caps[1], line_no));
            continue;
        }

        let mut declared: Option<String> = None;
        let mut declared_fn: Option<String> = None;

        if let Some(caps) = CLASS_DECL.captures(line) {
            let keyword = caps[1].to_string();
            let name = caps[2].to_string();
            let kind = match keyword.as_str() {
                "interface" | "protocol" => TokenKind::Interface,
                "enum" => TokenKind::Enum,
                _ => TokenKind::Class,
            };
            sig.push(SignatureToken::new(kind, &name, line_no));
            push_heritage(&mut sig, &name, kind, line, caps.get(0).map_or(0, |m| m.end()));
            scopes.open_next(ScopeKind::Class, &name, None);
            declared = Some(name);
        } else if let Some(caps) = regex!(
            r"^\s*(?:(?:public|private|protected|internal|override|open|suspend|inline|static|fileprivate|mutating|@\w+)\s+)*(?:fun|func)\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?([A-Za-z_]\w*)"
        )
        .captures(line)
        {
            let name = caps[1].to_string();
            push_function(&mut sig, &scopes, &name, line_no);
            scopes.open_next(ScopeKind::Function, &name, None);
            declared_fn = Some(name.clone());
            declared = Some(name);
        } else if let Some(caps) = constant_decl().captures(line) {
            if !scopes.in_function() {
                sig.push(SignatureToken::new(TokenKind::Constant, &caps[1], line_no));
                declared = Some(caps[1].to_string());
            }
        } else if scopes.in_class_body() && !line.contains('=') {
            if let Some(caps) = METHOD_DECL.captures(line) {
                let name = caps[1].to_string();
                if !is_call_keyword(&name) {
                    push_function(&mut sig, &scopes, &name, line_no);
                    scopes.open_next(ScopeKind::Function, &name, None);
                    declared_fn = Some(name.clone());
                    declared = Some(name);
                }
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

static CLASS_DECL: Lazy<Regex> = Lazy::new(|| {
    built_in(&format!(
        r"^\s*{MODIFIERS}(?:enum\s+)?(class|interface|enum|struct|record|object|protocol)\s+([A-Za-z_]\w*)"
    ))
});

// `Type name(` for methods, `Name(` for constructors.
static METHOD_DECL: Lazy<Regex> = Lazy::new(|| {
    built_in(&format!(
        r"^\s*{MODIFIERS}(?:<[^>]*>\s*)?(?:[\w.<>\[\],?]+\s+)?([A-Za-z_]\w*)\s*\([^;]*$"
    ))
});

fn built_in(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| unreachable!("invalid built-in pattern: {err}"))
}

fn constant_decl() -> &'static Regex {
    regex!(
        r"^\s*(?:(?:public|private|protected|internal)\s+)?(?:static\s+final\s+[\w<>\[\],.? ]+?\s+|const\s+val\s+|const\s+[\w<>\[\]]+\s+|static\s+readonly\s+[\w<>\[\]]+\s+|static\s+let\s+)([A-Z][A-Z0-9_]*)\b"
    )
}

fn push_function(sig: &mut Signature, scopes: &BraceScopes, name: &str, line: usize) {
    if scopes.in_class_body() {
        let class = scopes.current_class();
        sig.push(SignatureToken::new(TokenKind::Method, name, line).in_container(class));
    } else if !scopes.in_function() {
        sig.push(SignatureToken::new(TokenKind::Function, name, line));
    }
}

/// `extends`/`implements` clauses, or the `:` list used by Kotlin, C# and Swift where the first
/// entry is treated as the base type.
fn push_heritage(sig: &mut Signature, name: &str, kind: TokenKind, line: &str, from: usize) {
    let rest = &line[from..];
    let rest = rest
        .trim_start()
        .strip_prefix('<')
        .map_or(rest, |generic| {
            generic.split_once('>').map_or(generic, |(_, tail)| tail)
        });
    let rest = regex!(r"^\s*\([^)]*\)").replace(rest, "");

    if let Some(caps) = regex!(r"\bextends\s+([^{]+?)(?:\s+implements\b|\{|$)").captures(&rest) {
        let parents = split_type_list(&caps[1]);
        // Interfaces may extend several parents; classes only one.
        let take = if kind == TokenKind::Interface {
            parents.len()
        } else {
            1
        };
        for parent in parents.iter().take(take) {
            sig.push_heritage(name, super::last_segment(parent), HeritageKind::Extends);
        }
    }
    if let Some(caps) = regex!(r"\bimplements\s+([^{]+)").captures(&rest) {
        for parent in split_type_list(&caps[1]) {
            sig.push_heritage(name, super::last_segment(&parent), HeritageKind::Implements);
        }
    }
    if let Some(caps) = regex!(r"^\s*:\s*([^{]+)").captures(&rest) {
        let list = caps[1].split(" where ").next().unwrap_or_default();
        for (idx, parent) in split_type_list(list).iter().enumerate() {
            let relation = if idx == 0 || kind == TokenKind::Interface {
                HeritageKind::Extends
            } else {
                HeritageKind::Implements
            };
            sig.push_heritage(name, super::last_segment(parent), relation);
        }
    }
}
