//! Read-only stack status (SPEC_FULL.md supplemented feature): classifies
//! the current stack the same way `submit` would, without writing
//! anything to `Git` or `Forge`. Backs `ghstack status` and `--dry-run`.

use crate::classifier::{self, Classified};
use crate::commit_msg::{self, GhstackTrailers};
use crate::config::Config;
use crate::error::Result;
use crate::forge::{self, Forge};
use crate::git::Git;
use crate::selector;

/// Classifies the stack rooted at `head_rev` without writing anything.
/// `only`, when non-empty, limits the report to that revision subset
/// (spec.md §4.3 step 4), mirroring [`crate::submit::submit`]. Pass `&[]`
/// to report on the full stack.
pub fn status(
    git: &dyn Git,
    forge: &dyn Forge,
    config: &Config,
    head_rev: &str,
    only: &[String],
) -> Result<Vec<Classified>> {
    let stack = selector::select_stack_restricted(git, config, head_rev, only)?;
    let remote_prs =
        forge::fetch_remote_prs(forge, git, &config.remote, &config.owner, &config.repo, &config.username)?;

    let parsed: Vec<(crate::git::CommitInfo, GhstackTrailers)> = stack
        .commits
        .iter()
        .map(|c| (c.clone(), commit_msg::parse(&c.message).ghstack))
        .collect();

    classifier::classify_stack(&parsed, &remote_prs, config.force)
}
