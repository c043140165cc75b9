use super::{collect_calls, regex, strip_line_comment, BraceScopes, ScopeKind};
use crate::language::Language;
use crate::types::{CallSite, Signature, SignatureToken, TokenKind};

const QUOTES: &[char] = &['"', '`', '\''];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    Import,
    Const,
}

pub(super) fn scan(content: &str, language: Language) -> Signature {
    let mut sig = Signature::empty(language);
    let mut scopes = BraceScopes::default();
    let mut block = Block::None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_line_comment(raw, language.line_comment());
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match block {
            Block::Import => {
                if trimmed.starts_with(')') {
                    block = Block::None;
                } else if let Some(caps) = regex!(r#"^(?:[\w.]+\s+)?"([^"]+)""#).captures(trimmed) {
                    sig.push(SignatureToken::new(TokenKind::Import, &caps[1], line_no));
                }
                continue;
            }
            Block::Const => {
                if trimmed.starts_with(')') {
                    block = Block::None;
                } else if let Some(caps) = regex!(r"^([A-Za-z_]\w*)").captures(trimmed) {
                    sig.push(SignatureToken::new(TokenKind::Constant, &caps[1], line_no));
                }
                continue;
            }
            Block::None => {}
        }

        if regex!(r"^import\s*\($").is_match(trimmed) {
            block = Block::Import;
            continue;
        }
        if let Some(caps) = regex!(r#"^import\s+(?:[\w.]+\s+)?"([^"]+)""#).captures(trimmed) {
            sig.push(SignatureToken::new(TokenKind::Import, &caps[1], line_no));
            continue;
        }
        if !scopes.in_function() {
            if regex!(r"^const\s*\($").is_match(trimmed) {
                block = Block::Const;
                continue;
            }
            if let Some(caps) = regex!(r"^const\s+([A-Za-z_]\w*)").captures(trimmed) {
                sig.push(SignatureToken::new(TokenKind::Constant, &caps[1], line_no));
                continue;
            }
        }

        let mut declared: Option<String> = None;
        let mut declared_fn: Option<String> = None;

        if let Some(caps) =
            regex!(r"^type\s+([A-Za-z_]\w*)(?:\[[^\]]*\])?\s+(struct|interface)\b").captures(trimmed)
        {
            let name = caps[1].to_string();
            let kind = if &caps[2] == "struct" {
                TokenKind::Class
            } else {
                TokenKind::Interface
            };
            sig.push(SignatureToken::new(kind, &name, line_no));
            declared = Some(name);
        } else if let Some(caps) =
            regex!(r"^func\s+\(\s*\w*\s*\*?\s*([A-Za-z_]\w*)(?:\[[^\]]*\])?\s*\)\s*([A-Za-z_]\w*)")
                .captures(trimmed)
        {
            let receiver = caps[1].to_string();
            let name = caps[2].to_string();
            sig.push(
                SignatureToken::new(TokenKind::Method, &name, line_no)
                    .in_container(Some(receiver.clone())),
            );
            scopes.open_next(ScopeKind::Function, &name, Some(receiver));
            declared_fn = Some(name.clone());
            declared = Some(name);
        } else if let Some(caps) = regex!(r"^func\s+([A-Za-z_]\w*)").captures(trimmed) {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Function, &name, line_no));
            scopes.open_next(ScopeKind::Function, &name, None);
            declared_fn = Some(name.clone());
            declared = Some(name);
        }

        // Receiver methods open their scope on this line; read the class after `advance`.
        let caller = declared_fn.or_else(|| scopes.current_function());
        let mut class = scopes.current_class();
        scopes.advance(line, QUOTES);
        if class.is_none() && declared.is_some() {
            class = scopes.current_class();
        }
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
