//! Land engine (spec.md §4.6): fast-forwards a landed stack onto the
//! upstream trunk branch, closes its PRs, and deletes their branches.

use crate::commit_msg;
use crate::config::Config;
use crate::error::{GhstackError, Result};
use crate::forge::Forge;
use crate::ghnum::{self, BranchKind};
use crate::git::{CommitInfo, Git, Oid};

#[derive(Debug, Clone)]
pub struct LandedPr {
    pub ghnum: u64,
    pub pr_number: u64,
}

/// Lands PR `pr_number` and every PR below it in its stack.
///
/// Preconditions checked here (spec.md §4.6, §7):
/// - the PR must be the top of its stack (no PR else depends on it as a
///   base) unless `config.force`, else `LandNotHeadOfStack`
/// - the PR's `orig` branch tip must match what's recorded as its last
///   pushed source id, else `LandStaleLocalState` (someone else pushed
///   since we last synced)
/// - the fast-forward push is retried with a bounded number of attempts
///   before surfacing `LandNonFastForward`
pub fn land(
    git: &dyn Git,
    forge: &dyn Forge,
    config: &Config,
    pr_number: u64,
) -> Result<Vec<LandedPr>> {
    let target_pr = forge.get_pr(&config.owner, &config.repo, pr_number)?;
    let Some(target_branch) = ghnum::parse_branch_name(&target_pr.head_ref) else {
        return Err(GhstackError::InvariantViolation {
            what: format!("PR #{pr_number} head ref {} is not a ghstack branch", target_pr.head_ref),
            diagnostics: String::new(),
        });
    };

    let remote_prs = crate::forge::fetch_remote_prs(
        forge,
        git,
        &config.remote,
        &config.owner,
        &config.repo,
        &config.username,
    )?;

    let blocking = remote_prs
        .values()
        .find(|pr| !pr.closed && pr.base_ref == target_pr.head_ref);
    if let Some(blocking_pr) = blocking {
        if !config.force {
            return Err(GhstackError::LandNotHeadOfStack {
                pr_number,
                blocking_pr_number: blocking_pr.number,
            });
        }
    }

    let mut chain = vec![(target_branch.ghnum, target_pr.clone())];
    let mut cursor = target_pr.base_ref.clone();
    while let Some(branch) = ghnum::parse_branch_name(&cursor) {
        let Some(pr) = remote_prs.get(&branch.ghnum) else {
            break;
        };
        chain.push((branch.ghnum, pr.clone()));
        cursor = pr.base_ref.clone();
    }
    chain.reverse(); // bottom of stack first

    let mut commits: Vec<CommitInfo> = Vec::with_capacity(chain.len());
    for (ghnum, _pr) in &chain {
        let orig_branch = ghnum::branch_name(&config.username, *ghnum, BranchKind::Orig);
        let orig_oid = git
            .resolve_local_ref(&orig_branch)?
            .ok_or_else(|| GhstackError::LandStaleLocalState { pr_number: *pr_with_num(&chain, *ghnum) })?;
        let info = git.commit_info(&orig_oid)?;

        let parsed = commit_msg::parse(&info.message);
        let remote_pr = remote_prs.get(ghnum);
        if let Some(remote_pr) = remote_pr {
            if parsed.ghstack.source_id.as_deref() != remote_pr.last_source_id.as_deref() {
                return Err(GhstackError::LandStaleLocalState { pr_number: remote_pr.number });
            }
        }
        commits.push(info);
    }

    let trunk_tip = git.resolve(&config.default_branch)?;
    let mut parent = trunk_tip.clone();
    let mut rewritten = Vec::with_capacity(commits.len());
    for commit in &commits {
        let parsed = commit_msg::parse(&commit.message);
        let landed_message = parsed.prose;
        let new_oid = git.create_commit(
            &commit.tree,
            &[parent.clone()],
            &commit.author,
            &commit.committer,
            &landed_message,
        )?;
        rewritten.push(new_oid.clone());
        parent = new_oid;
    }
    let new_trunk_tip = parent;

    push_with_retry(git, config, &new_trunk_tip, 3)?;

    let mut landed = Vec::with_capacity(chain.len());
    for (ghnum, pr) in &chain {
        forge.close_pr(&config.owner, &config.repo, pr.number)?;
        for kind in [BranchKind::Base, BranchKind::Head, BranchKind::Orig] {
            let branch = ghnum::branch_name(&config.username, *ghnum, kind);
            git.delete_remote_branch(&config.remote, &branch)?;
        }
        landed.push(LandedPr {
            ghnum: *ghnum,
            pr_number: pr.number,
        });
    }

    Ok(landed)
}

fn pr_with_num(chain: &[(u64, crate::forge::PrInfo)], ghnum: u64) -> &u64 {
    chain
        .iter()
        .find(|(n, _)| *n == ghnum)
        .map(|(_, pr)| &pr.number)
        .expect("ghnum came from this chain")
}

fn push_with_retry(git: &dyn Git, config: &Config, new_tip: &Oid, attempts: u32) -> Result<()> {
    let dest = format!("{}:refs/heads/{}", new_tip, config.default_branch);
    let mut last_err = None;
    for _ in 0..attempts {
        match git.push(&config.remote, &[dest.clone()], &[]) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(GhstackError::LandNonFastForward {
        branch: config.default_branch.clone(),
        attempts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pr_with_num_finds_matching_entry() {
        let pr = crate::forge::PrInfo {
            number: 7,
            closed: false,
            branch_deleted: false,
            last_source_id: None,
            title: String::new(),
            body: String::new(),
            base_ref: String::new(),
            head_ref: String::new(),
        };
        let chain = vec![(5u64, pr)];
        assert_eq!(*pr_with_num(&chain, 5), 7);
    }
}
