use super::{
    collect_calls, indent_width, is_upper_constant, regex, split_type_list, strip_line_comment,
    IndentScopes, ScopeKind,
};
use crate::language::Language;
use crate::types::{CallSite, HeritageKind, Signature, SignatureToken, TokenKind};

pub(super) fn scan(content: &str, language: Language) -> Signature {
    let mut sig = Signature::empty(language);
    let mut scopes = IndentScopes::default();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_line_comment(raw, language.line_comment());
        if line.trim().is_empty() {
            continue;
        }
        let indent = indent_width(line);
        scopes.enter_line(indent);

        if let Some(caps) = regex!(r"^\s*from\s+([.\w]+)\s+import\b").captures(line) {
            sig.push(SignatureToken::new(TokenKind::Import, &caps[1], line_no));
            continue;
        }
        if let Some(caps) = regex!(r"^\s*import\s+(.+)$").captures(line) {
            for module in caps[1].split(',') {
                if let Some(target) = module.split_whitespace().next() {
                    sig.push(SignatureToken::new(TokenKind::Import, target, line_no));
                }
            }
            continue;
        }

        let mut declared: Option<String> = None;
        let mut declared_fn: Option<String> = None;

        if let Some(caps) = regex!(r"^\s*class\s+([A-Za-z_]\w*)\s*(?:\(([^)]*)\))?\s*:").captures(line)
        {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Class, &name, line_no));
            if let Some(bases) = caps.get(2) {
                let positional = bases.as_str().split(',').filter(|b| !b.contains('='));
                for base in positional.flat_map(split_type_list) {
                    if base != "object" {
                        sig.push_heritage(&name, &base, HeritageKind::Extends);
                    }
                }
            }
            scopes.push(indent, ScopeKind::Class, &name);
            declared = Some(name);
        } else if let Some(caps) = regex!(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").captures(line)
        {
            let name = caps[1].to_string();
            match scopes.innermost_kind() {
                Some(ScopeKind::Class) => {
                    let class = scopes.current_class();
                    sig.push(
                        SignatureToken::new(TokenKind::Method, &name, line_no).in_container(class),
                    );
                }
                Some(ScopeKind::Function) => {}
                None => sig.push(SignatureToken::new(TokenKind::Function, &name, line_no)),
            }
            scopes.push(indent, ScopeKind::Function, &name);
            declared_fn = Some(name.clone());
            declared = Some(name);
        } else if indent == 0 {
            if let Some(caps) = regex!(r"^([A-Za-z_]\w*)\s*(?::[^=]+)?=[^=]").captures(line) {
                if is_upper_constant(&caps[1]) {
                    sig.push(SignatureToken::new(TokenKind::Constant, &caps[1], line_no));
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
    }

    sig
}
