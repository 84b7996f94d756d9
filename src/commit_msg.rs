//! Commit-message codec: parse and emit the ghstack trailer block at the
//! tail of a commit message (spec.md §4.1, §6).
//!
//! Trailers are the maximal suffix of lines of the form `<key>: <value>`,
//! separated from the prose by a blank line. Unknown trailers (e.g.
//! `Differential Revision`, `Signed-off-by`) round-trip verbatim in their
//! original order; ghstack's own trailers are re-emitted in a fixed order
//! after them.

use crate::error::{GhstackError, Result};
use crate::re;

pub const KEY_SOURCE_ID: &str = "ghstack-source-id";
pub const KEY_COMMENT_ID: &str = "ghstack-comment-id";
pub const KEY_PR_RESOLVED: &str = "Pull Request resolved";
pub const KEY_PR_DIRECT: &str = "Pull-Request";

/// A single non-ghstack trailer line, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub key: String,
    pub value: String,
}

/// The ghstack-owned trailers for one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GhstackTrailers {
    pub source_id: Option<String>,
    pub comment_id: Option<i64>,
    pub pr_url: Option<String>,
    /// `true` if `pr_url` was recorded under `Pull-Request:` (direct mode)
    /// rather than `Pull Request resolved:` (classic mode).
    pub direct: bool,
}

impl GhstackTrailers {
    pub fn is_empty(&self) -> bool {
        self.source_id.is_none() && self.comment_id.is_none() && self.pr_url.is_none()
    }
}

/// A commit message split into its prose body and trailer sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub prose: String,
    pub user_trailers: Vec<Trailer>,
    pub ghstack: GhstackTrailers,
}

re!(trailer_line_re, r"^([A-Za-z][A-Za-z0-9 _-]*): (.*)$");

/// Parses a commit message into prose and trailers. Tolerates CR+LF line
/// endings (Rust's `str::lines` already strips a trailing `\r`).
pub fn parse(msg: &str) -> ParsedMessage {
    let lines: Vec<&str> = msg.lines().collect();
    let re = trailer_line_re();

    let mut trailer_start = lines.len();
    while trailer_start > 0
        && !lines[trailer_start - 1].is_empty()
        && re.is_match(lines[trailer_start - 1])
    {
        trailer_start -= 1;
    }

    let has_separator =
        trailer_start == 0 || lines.get(trailer_start - 1).copied() == Some("");
    let found_any_trailers = trailer_start < lines.len();

    let (prose_lines, trailer_lines): (&[&str], &[&str]) =
        if found_any_trailers && has_separator {
            let prose_end = trailer_start.saturating_sub(1);
            (&lines[..prose_end], &lines[trailer_start..])
        } else {
            (&lines[..], &[])
        };

    let mut user_trailers = Vec::new();
    let mut ghstack = GhstackTrailers::default();
    for line in trailer_lines {
        let caps = re.captures(line).expect("line matched trailer_line_re above");
        let key = caps.get(1).unwrap().as_str().to_string();
        let value = caps.get(2).unwrap().as_str().to_string();
        match key.as_str() {
            KEY_SOURCE_ID => ghstack.source_id = Some(value),
            KEY_COMMENT_ID => ghstack.comment_id = value.parse().ok(),
            KEY_PR_RESOLVED => {
                ghstack.pr_url = Some(value);
                ghstack.direct = false;
            }
            KEY_PR_DIRECT => {
                ghstack.pr_url = Some(value);
                ghstack.direct = true;
            }
            _ => user_trailers.push(Trailer { key, value }),
        }
    }

    ParsedMessage {
        prose: prose_lines.join("\n"),
        user_trailers,
        ghstack,
    }
}

/// Re-emits a commit message from prose and trailers, in the deterministic
/// order specified by spec.md §4.1: user trailers first (original order),
/// then `ghstack-source-id`, then `ghstack-comment-id`, then the PR-url
/// trailer.
pub fn emit(prose: &str, user_trailers: &[Trailer], ghstack: &GhstackTrailers) -> String {
    let mut trailer_lines = Vec::new();
    for t in user_trailers {
        trailer_lines.push(format!("{}: {}", t.key, t.value));
    }
    if let Some(sid) = &ghstack.source_id {
        trailer_lines.push(format!("{KEY_SOURCE_ID}: {sid}"));
    }
    if let Some(cid) = &ghstack.comment_id {
        trailer_lines.push(format!("{KEY_COMMENT_ID}: {cid}"));
    }
    if let Some(url) = &ghstack.pr_url {
        let key = if ghstack.direct { KEY_PR_DIRECT } else { KEY_PR_RESOLVED };
        trailer_lines.push(format!("{key}: {url}"));
    }

    let prose = prose.trim_end_matches('\n');
    if trailer_lines.is_empty() {
        return prose.to_string();
    }
    if prose.is_empty() {
        trailer_lines.join("\n")
    } else {
        format!("{}\n\n{}", prose, trailer_lines.join("\n"))
    }
}

/// Computes `ghstack-source-id`: a hash over `(tree_hash, prose,
/// non-ghstack trailers)`, deliberately excluding the ghstack trailers
/// themselves so re-emitting the message is stable (spec.md §4.1).
pub fn compute_source_id(
    hash_kind: gix::hash::Kind,
    tree_hash: &str,
    prose: &str,
    user_trailers: &[Trailer],
) -> Result<String> {
    let mut input = String::new();
    input.push_str(tree_hash);
    input.push('\n');
    input.push_str(prose);
    input.push('\n');
    for t in user_trailers {
        input.push_str(&t.key);
        input.push_str(": ");
        input.push_str(&t.value);
        input.push('\n');
    }

    let oid = gix::diff::object::compute_hash(hash_kind, gix::object::Kind::Blob, input.as_bytes())
        .map_err(|e| GhstackError::Git {
            command: "compute-source-id".to_string(),
            stderr: e.to_string(),
        })?;
    Ok(oid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_prose_and_unknown_trailers() {
        let msg = "Fix the frobnicator\n\nIt was broken.\n\nSigned-off-by: Alice <a@example.com>";
        let parsed = parse(msg);
        assert_eq!(parsed.prose, "Fix the frobnicator\n\nIt was broken.");
        assert_eq!(
            parsed.user_trailers,
            vec![Trailer {
                key: "Signed-off-by".to_string(),
                value: "Alice <a@example.com>".to_string()
            }]
        );
        assert!(parsed.ghstack.is_empty());

        let re_emitted = emit(&parsed.prose, &parsed.user_trailers, &parsed.ghstack);
        assert_eq!(re_emitted, msg);
        assert_eq!(parse(&re_emitted), parsed);
    }

    #[test]
    fn parses_ghstack_trailers_classic_mode() {
        let msg = "Add widget\n\ngherrit-unrelated prose\n\nghstack-source-id: abc123\nPull Request resolved: https://github.com/o/r/pull/500";
        let parsed = parse(msg);
        assert_eq!(parsed.ghstack.source_id.as_deref(), Some("abc123"));
        assert_eq!(
            parsed.ghstack.pr_url.as_deref(),
            Some("https://github.com/o/r/pull/500")
        );
        assert!(!parsed.ghstack.direct);
    }

    #[test]
    fn parses_direct_mode_pull_request_trailer() {
        let msg = "Add widget\n\nghstack-source-id: abc123\nPull-Request: https://github.com/o/r/pull/12\nghstack-comment-id: 99";
        let parsed = parse(msg);
        assert!(parsed.ghstack.direct);
        assert_eq!(parsed.ghstack.comment_id, Some(99));
    }

    #[test]
    fn no_blank_separator_means_no_trailer_block() {
        // Looks trailer-shaped, but there's no blank-line separator, so the
        // whole thing is prose.
        let msg = "Title\nghstack-source-id: abc123";
        let parsed = parse(msg);
        assert_eq!(parsed.prose, msg);
        assert!(parsed.ghstack.is_empty());
    }

    #[test]
    fn emit_orders_user_trailers_before_ghstack_trailers() {
        let ghstack = GhstackTrailers {
            source_id: Some("deadbeef".to_string()),
            comment_id: None,
            pr_url: Some("https://github.com/o/r/pull/7".to_string()),
            direct: false,
        };
        let user = vec![Trailer {
            key: "Signed-off-by".to_string(),
            value: "Bob".to_string(),
        }];
        let msg = emit("Title only", &user, &ghstack);
        assert_eq!(
            msg,
            "Title only\n\nSigned-off-by: Bob\nghstack-source-id: deadbeef\nPull Request resolved: https://github.com/o/r/pull/7"
        );
    }

    #[test]
    fn crlf_is_stripped_on_parse() {
        let msg = "Title\r\n\r\nghstack-source-id: abc\r\n";
        let parsed = parse(msg);
        assert_eq!(parsed.ghstack.source_id.as_deref(), Some("abc"));
    }

    #[test]
    fn compute_source_id_excludes_ghstack_trailers() {
        let hash_kind = gix::hash::Kind::Sha1;
        let id1 = compute_source_id(hash_kind, "treehash", "Some prose", &[]).unwrap();
        let id2 = compute_source_id(hash_kind, "treehash", "Some prose", &[]).unwrap();
        assert_eq!(id1, id2, "hash must be deterministic over identical input");

        let id3 = compute_source_id(hash_kind, "treehash", "Different prose", &[]).unwrap();
        assert_ne!(id1, id3);
    }
}
