use super::{
    collect_calls, is_call_keyword, is_upper_constant, regex, split_type_list, strip_line_comment,
    BraceScopes, ScopeKind,
};
use crate::language::Language;
use crate::types::{CallSite, HeritageKind, Signature, SignatureToken, TokenKind};

const QUOTES: &[char] = &['"', '\'', '`'];

/// TypeScript / JavaScript.
pub(super) fn scan(content: &str, language: Language) -> Signature {
    let mut sig = Signature::empty(language);
    let mut scopes = BraceScopes::default();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_line_comment(raw, language.line_comment());
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('*') || trimmed.starts_with("/*") {
            continue;
        }

        for target in import_targets(line) {
            sig.push(SignatureToken::new(TokenKind::Import, target, line_no));
        }

        let mut declared: Option<String> = None;
        let mut declared_fn: Option<String> = None;

        if let Some(caps) = regex!(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)(?:\s*<[^>{]*>)?(?:\s+extends\s+([\w$.]+)(?:<[^>{]*>)?)?(?:\s+implements\s+([^{]+))?"
        )
        .captures(line)
        {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Class, &name, line_no));
            if let Some(parent) = caps.get(2) {
                sig.push_heritage(&name, parent.as_str(), HeritageKind::Extends);
            }
            if let Some(list) = caps.get(3) {
                for parent in split_type_list(list.as_str()) {
                    sig.push_heritage(&name, &parent, HeritageKind::Implements);
                }
            }
            scopes.open_next(ScopeKind::Class, &name, None);
            declared = Some(name);
        } else if let Some(caps) = regex!(
            r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+([A-Za-z_$][\w$]*)(?:\s*<[^>{]*>)?(?:\s+extends\s+([^{]+))?"
        )
        .captures(line)
        {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Interface, &name, line_no));
            if let Some(list) = caps.get(2) {
                for parent in split_type_list(list.as_str()) {
                    sig.push_heritage(&name, &parent, HeritageKind::Extends);
                }
            }
            scopes.open_next(ScopeKind::Class, &name, None);
            declared = Some(name);
        } else if let Some(caps) =
            regex!(r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+([A-Za-z_$][\w$]*)")
                .captures(line)
        {
            let name = caps[1].to_string();
            sig.push(SignatureToken::new(TokenKind::Enum, &name, line_no));
            declared = Some(name);
        } else if let Some(caps) = regex!(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*[<(]"
        )
        .captures(line)
        {
            let name = caps[1].to_string();
            if !scopes.in_function() {
                sig.push(SignatureToken::new(TokenKind::Function, &name, line_no));
            }
            scopes.open_next(ScopeKind::Function, &name, None);
            declared_fn = Some(name.clone());
            declared = Some(name);
        } else if let Some(caps) = regex!(
            r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)"
        )
        .captures(line)
        {
            if !scopes.in_function() {
                let name = caps[1].to_string();
                sig.push(SignatureToken::new(TokenKind::Function, &name, line_no));
                scopes.open_next(ScopeKind::Function, &name, None);
                declared_fn = Some(name.clone());
                declared = Some(name);
            }
        } else if let Some(caps) =
            regex!(r"^\s*(?:export\s+)?const\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=").captures(line)
        {
            let name = &caps[1];
            if !scopes.in_function() && scopes.current_class().is_none() && is_upper_constant(name)
            {
                sig.push(SignatureToken::new(TokenKind::Constant, name, line_no));
                declared = Some(name.to_string());
            }
        } else if scopes.in_class_body() && line.contains('{') {
            if let Some(caps) = regex!(
                r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*\*?([A-Za-z_$#][\w$]*)\s*(?:<[^>]*>)?\s*\([^;]*$"
            )
            .captures(line)
            {
                let name = caps[1].trim_start_matches('#').to_string();
                if !is_call_keyword(&name) || name == "constructor" {
                    let class = scopes.current_class();
                    sig.push(
                        SignatureToken::new(TokenKind::Method, &name, line_no).in_container(class),
                    );
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

fn import_targets(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(caps) =
        regex!(r#"^\s*(?:import|export)\b[^'"]*?\bfrom\s*['"]([^'"]+)['"]"#).captures(line)
    {
        out.push(caps[1].to_string());
    } else if let Some(caps) = regex!(r#"^\s*import\s*['"]([^'"]+)['"]"#).captures(line) {
        out.push(caps[1].to_string());
    }
    for caps in regex!(r#"\b(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#).captures_iter(line) {
        out.push(caps[1].to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"
import { helper } from './util';
import express from "express";
const fs = require('fs');

export const MAX_RETRIES = 3;

export interface Repo extends Base<T> {
  find(id: string): User;
}

export class UserService extends BaseService implements Repo, Disposable {
  constructor(private db: Db) {
    super(db);
  }

  async load(id: string): Promise<User> {
    const row = this.fetch(id);
    return helper(row);
  }

  fetch(id: string) {
    return query(id);
  }
}

export function bootstrap() {
  const svc = new UserService(db);
  svc.load("1");
}

export const handler = async (req) => {
  return bootstrap();
};

enum Color { Red, Green }
"#;

    #[test]
    fn extracts_typescript_tokens() {
        let sig = scan(SOURCE, Language::TypeScript);
        assert_eq!(
            sig.sorted_tokens(),
            vec![
                "class:UserService",
                "constant:MAX_RETRIES",
                "enum:Color",
                "function:bootstrap",
                "function:handler",
                "import:./util",
                "import:express",
                "import:fs",
                "interface:Repo",
                "method:constructor",
                "method:fetch",
                "method:load",
            ]
        );
    }

    #[test]
    fn methods_carry_their_class() {
        let sig = scan(SOURCE, Language::TypeScript);
        let load = sig
            .tokens
            .iter()
            .find(|t| t.name == "load")
            .expect("load method");
        assert_eq!(load.container.as_deref(), Some("UserService"));
    }

    #[test]
    fn extracts_heritage() {
        let sig = scan(SOURCE, Language::TypeScript);
        let pairs: Vec<(String, String, HeritageKind)> = sig
            .heritage
            .iter()
            .map(|h| (h.child.clone(), h.parent.clone(), h.kind))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Repo".into(), "Base".into(), HeritageKind::Extends),
                ("UserService".into(), "BaseService".into(), HeritageKind::Extends),
                ("UserService".into(), "Repo".into(), HeritageKind::Implements),
                ("UserService".into(), "Disposable".into(), HeritageKind::Implements),
            ]
        );
    }

    #[test]
    fn attributes_calls_to_callers() {
        let sig = scan(SOURCE, Language::TypeScript);
        let fetch_call = sig
            .calls
            .iter()
            .find(|c| c.callee == "fetch")
            .expect("fetch call");
        assert_eq!(fetch_call.caller.as_deref(), Some("load"));
        assert_eq!(fetch_call.class.as_deref(), Some("UserService"));

        let load_call = sig
            .calls
            .iter()
            .find(|c| c.callee == "load")
            .expect("load call");
        assert_eq!(load_call.caller.as_deref(), Some("bootstrap"));
        assert_eq!(load_call.class, None);
    }
}
