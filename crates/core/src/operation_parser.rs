//! `OperationParser` — extracts structured `FileOp`s from an
//! agent's free-form reply. Treats model output as adversarial: fence
//! imbalance, stray backticks, hallucinated directives, and missing
//! content blocks are routine. The grammar stays tiny and the tolerance
//! policy explicit: drop, warn, continue — never raise.
//!
//! A directive is a single fence whose opening info string matches the
//! directive grammar (`` ```filename:<path> ``, `` ```update:<path> ``, or
//! `` ```read:<path> ``, optional whitespace around the colon tolerated):
//! that same fence's body is the content. There is no lookahead to a
//! following fence and no "pending directive" state carried between
//! fences — a directive whose own body is empty is dropped (and a warning
//! recorded) rather than borrowing content from whatever fence comes next.

use regex::Regex;
use std::sync::OnceLock;

use crate::file_store::{sanitize_path, FileOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKind {
    Create,
    Update,
    Read,
}

struct Directive {
    kind: DirectiveKind,
    path: String,
}

fn directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(filename|update|read)\s*:\s*(.+?)\s*$").expect("valid regex")
    })
}

fn parse_directive(info: &str) -> Option<Directive> {
    let caps = directive_re().captures(info)?;
    let kind = match caps[1].to_ascii_lowercase().as_str() {
        "filename" => DirectiveKind::Create,
        "update" => DirectiveKind::Update,
        "read" => DirectiveKind::Read,
        _ => return None,
    };
    Some(Directive {
        kind,
        path: caps[2].to_string(),
    })
}

/// One triple-backtick-delimited block: the text on the opening line after
/// the backticks (a language hint or a directive), and the body between
/// the opening and closing fence lines.
struct Fence {
    info: String,
    body: String,
}

/// Scans for fences greedily and non-nesting: an opening ``` line consumes
/// until the next ``` line, wherever it falls in the text. A fence opened
/// and closed on the same physical line (e.g. `` ```read:a.py``` ``) is
/// recognized too, with an empty body.
fn scan_fences(reply: &str) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut lines = reply.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed_start = line.trim_start();
        if let Some(rest) = trimmed_start.strip_prefix("```") {
            if let Some(before_close) = rest.find("```") {
                fences.push(Fence {
                    info: rest[..before_close].trim().to_string(),
                    body: String::new(),
                });
                continue;
            }

            let info = rest.trim().to_string();
            let mut body_lines = Vec::new();
            let mut closed = false;
            for body_line in lines.by_ref() {
                if body_line.trim_start().starts_with("```") {
                    closed = true;
                    break;
                }
                body_lines.push(body_line);
            }
            if closed {
                fences.push(Fence {
                    info,
                    body: body_lines.join("\n"),
                });
            }
            // An unterminated fence at end-of-reply is discarded entirely —
            // there is no well-formed content to extract from it.
        }
    }

    fences
}

const COMPLETION_PHRASES: &[&str] = &[
    "project is complete",
    "all requirements met",
    "ready for deployment",
    "no further improvements needed",
    "implementation is complete",
    "all tests pass and the project is done",
    "nothing further to add",
    "task is fully complete",
];

/// Disjunction of substring matches against the closed completion-phrase
/// set, applied to the whole reply lowercased.
pub fn detect_completion_signal(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    COMPLETION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Parses one agent reply into the ordered `FileOp`s it contains plus its
/// completion signal. Ops are emitted in source order; malformed or
/// empty-after-sanitize ops are silently dropped (the caller may choose to
/// log `warnings` at `warn` level — this function itself never logs, to
/// keep it a pure, independently testable unit).
pub fn parse(reply: &str) -> (Vec<FileOp>, bool, Vec<String>) {
    let mut ops = Vec::new();
    let mut warnings = Vec::new();

    for fence in scan_fences(reply) {
        let Some(directive) = parse_directive(&fence.info) else {
            continue;
        };

        let Some(path) = sanitize_path(&directive.path) else {
            warnings.push(format!(
                "dropped {:?} op: path sanitized to empty ({:?})",
                directive.kind, directive.path
            ));
            continue;
        };

        match directive.kind {
            DirectiveKind::Read => ops.push(FileOp::Read { path }),
            DirectiveKind::Create => {
                if fence.body.trim().is_empty() {
                    warnings.push(format!("dropped create op for {path}: no content block"));
                    continue;
                }
                ops.push(FileOp::Create {
                    path,
                    content: fence.body.clone(),
                });
            }
            DirectiveKind::Update => {
                if fence.body.trim().is_empty() {
                    warnings.push(format!("dropped update op for {path}: no content block"));
                    continue;
                }
                ops.push(FileOp::Update {
                    path,
                    content: fence.body.clone(),
                });
            }
        }
    }

    let completion = detect_completion_signal(reply);
    (ops, completion, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_create_and_update_in_source_order() {
        let reply = "Here goes:\n```filename:src/a.py\nprint(1)\n```\nand also\n```update:src/b.py\nprint(2)\n```\n";
        let (ops, completion, warnings) = parse(reply);
        assert_eq!(ops.len(), 2);
        assert!(warnings.is_empty());
        assert!(!completion);
        assert_eq!(
            ops[0],
            FileOp::Create {
                path: "src/a.py".into(),
                content: "print(1)".into()
            }
        );
        assert_eq!(
            ops[1],
            FileOp::Update {
                path: "src/b.py".into(),
                content: "print(2)".into()
            }
        );
    }

    #[test]
    fn parses_spaced_directive_form() {
        let (ops, _, _) = parse("```update: src/b.py\nprint(\"ok\")\n```\n");
        assert_eq!(
            ops[0],
            FileOp::Update {
                path: "src/b.py".into(),
                content: "print(\"ok\")".into()
            }
        );
    }

    #[test]
    fn malformed_fence_then_valid_update() {
        let reply = "```filename: src/a.py\n```\nfollowed by\n```update: src/b.py\nprint(\"ok\")\n```\n";
        let (ops, _, warnings) = parse(reply);
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0],
            FileOp::Update {
                path: "src/b.py".into(),
                content: "print(\"ok\")".into()
            }
        );
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn ignores_plain_code_fences_with_no_directive() {
        let reply = "```python\nprint('hello')\n```\n";
        let (ops, _, warnings) = parse(reply);
        assert!(ops.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn read_directive_needs_no_content() {
        let (ops, _, _) = parse("```read:src/a.py```\n");
        assert_eq!(ops[0], FileOp::Read { path: "src/a.py".into() });
    }

    #[test]
    fn drops_ops_that_sanitize_to_empty_path() {
        let reply = "```filename: ../../etc/passwd\nrm -rf /\n```\n";
        let (ops, _, warnings) = parse(reply);
        assert!(ops.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unterminated_fence_is_discarded() {
        let reply = "```filename:src/a.py\nprint(1)\nno closing fence here";
        let (ops, _, _) = parse(reply);
        assert!(ops.is_empty());
    }

    #[test]
    fn detects_completion_phrase_case_insensitively() {
        assert!(detect_completion_signal(
            "I believe the PROJECT IS COMPLETE and ready to ship."
        ));
        assert!(!detect_completion_signal("still working on the backend."));
    }

    #[test]
    fn multiple_ops_preserve_source_order() {
        let reply = "```filename:a.py\n1\n```\n```filename:b.py\n2\n```\n```filename:c.py\n3\n```\n";
        let (ops, _, _) = parse(reply);
        let paths: Vec<&str> = ops.iter().map(|o| o.path()).collect();
        assert_eq!(paths, vec!["a.py", "b.py", "c.py"]);
    }
}
