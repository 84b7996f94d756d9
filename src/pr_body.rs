//! PR-body navigator renderer/parser (spec.md §4.2, §6).
//!
//! Classic (non-direct) PR bodies carry a leading `Stack:` navigator block
//! followed by the user's prose. Direct-mode bodies carry no navigator
//! block at all — the stack is encoded in `baseRefName` instead.

use crate::re;

const STACK_HEADER: &str = "Stack:";
const PROSE_SEPARATOR: &str = "----";

re!(self_entry_re, r"^\* __->__ #(\d+)$");
re!(sibling_entry_re, r"^\* #(\d+)$");

/// The result of parsing a PR body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedBody {
    /// PR numbers from the navigator block, top of stack first. Empty in
    /// direct mode (no navigator block present).
    pub stack_refs: Vec<u64>,
    pub prose: String,
    /// Reserved for unknown content a forge or user appends after the
    /// prose. ghstack's own renderer never produces any, so this is always
    /// empty for bodies it authored; kept for signature fidelity with
    /// spec.md §4.2's `parse(body) -> (stack_refs, prose, trailing)`.
    pub trailing: String,
}

/// Parses a PR body into its navigator block and prose.
pub fn parse(body: &str) -> ParsedBody {
    let lines: Vec<&str> = body.lines().collect();

    if lines.first() != Some(&STACK_HEADER) {
        return ParsedBody {
            stack_refs: Vec::new(),
            prose: body.trim_end_matches('\n').to_string(),
            trailing: String::new(),
        };
    }

    let self_re = self_entry_re();
    let sibling_re = sibling_entry_re();

    let mut stack_refs = Vec::new();
    let mut i = 1;
    while i < lines.len() {
        let line = lines[i];
        if let Some(caps) = self_re.captures(line) {
            stack_refs.push(caps[1].parse().expect("regex guarantees digits"));
        } else if let Some(caps) = sibling_re.captures(line) {
            stack_refs.push(caps[1].parse().expect("regex guarantees digits"));
        } else {
            break;
        }
        i += 1;
    }

    // Skip the blank line separating the navigator block from the prose.
    if lines.get(i) == Some(&"") {
        i += 1;
    }

    // Skip the disambiguating "----" separator, if present, plus its
    // trailing blank line.
    if lines.get(i) == Some(&PROSE_SEPARATOR) {
        i += 1;
        if lines.get(i) == Some(&"") {
            i += 1;
        }
    }

    let prose = lines[i..].join("\n");
    ParsedBody {
        stack_refs,
        prose,
        trailing: String::new(),
    }
}

/// Renders a PR body. `stack_refs` is the full ordered stack (top of stack
/// first, including `self_pr`); pass an empty slice for direct mode, which
/// omits the navigator block entirely. A `----` separator is inserted
/// before prose that begins with a Markdown list item, to keep GitHub from
/// rendering it as a continuation of the navigator list.
pub fn render(stack_refs: &[u64], self_pr: u64, prose: &str) -> String {
    if stack_refs.is_empty() {
        return prose.to_string();
    }

    let mut out = String::from(STACK_HEADER);
    out.push('\n');
    for &pr in stack_refs {
        if pr == self_pr {
            out.push_str(&format!("* __->__ #{pr}\n"));
        } else {
            out.push_str(&format!("* #{pr}\n"));
        }
    }
    out.push('\n');

    let needs_separator = prose
        .trim_start()
        .starts_with(|c| c == '*' || c == '-')
        && prose
            .trim_start()
            .chars()
            .nth(1)
            .is_some_and(|c| c == ' ' || c == '-');
    if needs_separator {
        out.push_str(PROSE_SEPARATOR);
        out.push_str("\n\n");
    }

    out.push_str(prose);
    out
}
