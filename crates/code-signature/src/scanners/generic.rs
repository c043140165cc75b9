//! Fallback for languages without a dedicated scanner (C, C++, Ruby, unknown text).
//!
//! Only obvious declaration lines are recognised; anything else contributes calls at most.

use super::{collect_calls, regex, strip_line_comment, BraceScopes, ScopeKind};
use crate::language::Language;
use crate::types::{CallSite, HeritageKind, Signature, SignatureToken, TokenKind};

const QUOTES: &[char] = &['"'];

pub(super) fn scan(content: &str, language: Language) -> Signature {
    let mut sig = Signature::empty(language);
    let mut scopes = BraceScopes::default();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_line_comment(raw, language.line_comment());
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) =
            regex!(r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#).captures(line)
        {
            sig.push(SignatureToken::new(TokenKind::Import, &caps[1], line_no));
            continue;
        }
        if let Some(caps) =
            regex!(r#"^\s*(?:require|require_relative|load)\s*\(?\s*['"]([^'"]+)['"]"#)
                .captures(line)
        {
            sig.push(SignatureToken::new(TokenKind::Import, &caps[1], line_no));
            continue;
        }

        let mut declared: Option<String> = None;
        let mut declared_fn: Option<String> = None;

        if let Some(caps) = regex!(
            r"^\s*(?:class|module|struct)\s+([A-Za-z_][\w:]*)(?:\s*<\s*([A-Za-z_][\w:]*))?(?:\s*:\s*(?:public|private|protected)?\s*([A-Za-z_][\w:]*))?"
        )
        .captures(line)
        {
            let name = super::last_segment(&caps[1]).to_string();
            sig.push(SignatureToken::new(TokenKind::Class, &name, line_no));
            if let Some(parent) = caps.get(2).or_else(|| caps.get(3)) {
                sig.push_heritage(
                    &name,
                    super::last_segment(parent.as_str()),
                    HeritageKind::Extends,
                );
            }
            scopes.open_next(ScopeKind::Class, &name, None);
            declared = Some(name);
        } else if let Some(caps) =
            regex!(r"^\s*(?:def|fn|func|function|sub)\s+(?:self\.)?([A-Za-z_]\w*[?!]?)")
                .captures(line)
        {
            let name = caps[1].to_string();
            push_function(&mut sig, &scopes, &name, line_no);
            scopes.open_next(ScopeKind::Function, &name, None);
            declared_fn = Some(name.clone());
            declared = Some(name);
        } else if let Some(caps) = regex!(
            r"^[A-Za-z_][\w\s\*&:<>,]*?\b([A-Za-z_]\w*)\s*\([^;]*\)\s*(?:const\s*)?\{?\s*$"
        )
        .captures(line)
        {
            // C-style definition at column zero.
            let name = caps[1].to_string();
            if !super::is_call_keyword(&name) {
                push_function(&mut sig, &scopes, &name, line_no);
                scopes.open_next(ScopeKind::Function, &name, None);
                declared_fn = Some(name.clone());
                declared = Some(name);
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

fn push_function(sig: &mut Signature, scopes: &BraceScopes, name: &str, line: usize) {
    if scopes.in_class_body() {
        let class = scopes.current_class();
        sig.push(SignatureToken::new(TokenKind::Method, name, line).in_container(class));
    } else if !scopes.in_function() {
        sig.push(SignatureToken::new(TokenKind::Function, name, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_c_definitions_and_includes() {
        let source = r#"
#include <stdio.h>
#include "util.h"

struct point {
    int x;
};

static int add(int a, int b)
{
    return helper(a) + b;
}
"#;
        let sig = scan(source, Language::C);
        assert_eq!(
            sig.sorted_tokens(),
            vec![
                "class:point",
                "function:add",
                "import:stdio.h",
                "import:util.h",
            ]
        );
    }

    #[test]
    fn extracts_ruby_classes() {
        let source = "require 'json'\n\nclass Admin < User\n  def promote!\n    save\n  end\nend\n";
        let sig = scan(source, Language::Ruby);
        assert_eq!(
            sig.sorted_tokens(),
            vec!["class:Admin", "function:promote!", "import:json"]
        );
        assert_eq!(sig.heritage[0].parent, "User");
    }

    #[test]
    fn unknown_text_yields_nothing_structural() {
        let sig = scan("just some notes\nwith words\n", Language::Unknown);
        assert!(sig.tokens.is_empty());
    }
}
