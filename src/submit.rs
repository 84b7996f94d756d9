//! Submission engine (spec.md §4.5): pushes a local stack to the forge,
//! bottom to top, creating or updating one PR per commit.

use std::collections::HashSet;

use crate::classifier::{self, Classification};
use crate::commit_msg::{self, GhstackTrailers};
use crate::config::{Config, Mode};
use crate::error::{GhstackError, Result};
use crate::forge::{self, Forge, NewPr, PrUpdate};
use crate::ghnum::{self, BranchKind, GhNumAllocator};
use crate::git::{Git, Oid, PushPlan};
use crate::pr_body;
use crate::selector;

/// One row of the submission report, returned to the CLI for rendering
/// (spec.md §6 "Out: submission report").
#[derive(Debug, Clone)]
pub struct SubmitResultRow {
    pub ghnum: u64,
    pub pr_number: u64,
    pub pr_url: String,
    pub action: SubmitAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitAction {
    Created,
    Updated,
    Unchanged,
}

/// One commit's assigned ghnum/PR slot, decided in a first pass over the
/// whole stack so the navigator block (which names every sibling PR) can
/// be rendered once every PR number is known (spec.md §4.2, §9).
struct Plan {
    ghnum: u64,
    is_new: bool,
    pr_number: Option<u64>,
    commit: crate::git::CommitInfo,
    prose: String,
    user_trailers: Vec<commit_msg::Trailer>,
}

/// Pushes the stack rooted at `head_rev` to the forge. `only`, when
/// non-empty, restricts the push to that revision subset (spec.md §4.3
/// step 4: `revs`/`stack=True/False`) — e.g. `ghstack submit --only HEAD~1`
/// to push only the second-from-top commit even though the whole stack
/// below it is still walked and validated. Pass `&[]` to operate on the
/// full stack.
///
/// Note on `config.dry_run`: the CLI never calls this function in dry-run
/// mode (it calls [`crate::status::status`] instead, which touches neither
/// git nor the forge). `config.dry_run` is still honored here, guarding the
/// local `git.push`/`rewrite_messages` calls, so direct callers of this
/// function get the same guarantee without having to know about the split.
pub fn submit(
    git: &dyn Git,
    forge: &dyn Forge,
    config: &Config,
    head_rev: &str,
    only: &[String],
) -> Result<Vec<SubmitResultRow>> {
    let stack = selector::select_stack_restricted(git, config, head_rev, only)?;
    if stack.is_empty() {
        return Err(GhstackError::EmptyStack);
    }

    let remote_prs =
        forge::fetch_remote_prs(forge, git, &config.remote, &config.owner, &config.repo, &config.username)?;

    let parsed: Vec<(crate::git::CommitInfo, GhstackTrailers)> = stack
        .commits
        .iter()
        .map(|c| {
            let parsed = commit_msg::parse(&c.message);
            (c.clone(), parsed.ghstack)
        })
        .collect();

    let classified = classifier::classify_stack(&parsed, &remote_prs, config.force)?;

    let highest_known = forge.highest_known_ghnum(&config.owner, &config.repo, &config.username)?;
    let in_use: HashSet<u64> = remote_prs.keys().copied().collect();
    let mut allocator = GhNumAllocator::new(highest_known, in_use);

    // First pass: assign every row its final ghnum, preserving existing
    // ones and minting fresh ones for New rows, so the navigator block
    // (which names every sibling PR) can be rendered in a second pass
    // once every PR number is known (spec.md §4.2, §9).
    let mut plans = Vec::with_capacity(classified.len());
    for row in &classified {
        let parsed_msg = commit_msg::parse(&row.commit.message);
        let (ghnum, pr_number, is_new) = match row.classification {
            Classification::New => (allocator.allocate(), None, true),
            Classification::Skip { ghnum, pr_number } => (ghnum, Some(pr_number), false),
            Classification::Update { ghnum, pr_number } => (ghnum, Some(pr_number), false),
        };
        plans.push(Plan {
            ghnum,
            is_new,
            pr_number,
            commit: row.commit.clone(),
            prose: parsed_msg.prose,
            user_trailers: parsed_msg.user_trailers,
        });
    }

    let mut results = Vec::with_capacity(plans.len());
    let mut push_plan = PushPlan::default();
    let mut previous_head_branch = config.default_branch.clone();
    let mut previous_head_oid = stack.base.clone();
    let mut rewrites: Vec<(Oid, String)> = Vec::with_capacity(plans.len());

    for (idx, plan) in plans.iter().enumerate() {
        let row = &classified[idx];
        if matches!(row.classification, Classification::Skip { .. }) {
            let pr_number = plan.pr_number.expect("skip implies a known pr");
            results.push(SubmitResultRow {
                ghnum: plan.ghnum,
                pr_number,
                pr_url: pr_url(config, pr_number),
                action: SubmitAction::Unchanged,
            });
            previous_head_branch = ghnum::branch_name(&config.username, plan.ghnum, BranchKind::Head);
            previous_head_oid = forge::remote_tracking_oid(git, &config.remote, &previous_head_branch)
                .ok_or_else(|| GhstackError::InvariantViolation {
                    what: format!("expected remote-tracking ref for {previous_head_branch} to be fetched"),
                    diagnostics: String::new(),
                })?;
            rewrites.push((plan.commit.oid.clone(), plan.commit.message.clone()));
            continue;
        }

        let base_branch = match config.mode {
            Mode::Stack => ghnum::branch_name(&config.username, plan.ghnum, BranchKind::Base),
            Mode::Direct => previous_head_branch.clone(),
        };
        let head_branch = ghnum::branch_name(&config.username, plan.ghnum, BranchKind::Head);
        let orig_branch = ghnum::branch_name(&config.username, plan.ghnum, BranchKind::Orig);

        let (base_oid, head_oid) = match config.mode {
            Mode::Stack => {
                let (base_oid, head_oid) = if plan.is_new {
                    new_diff_stack(git, &previous_head_oid, plan)?
                } else {
                    update_diff_stack(git, &config.remote, &base_branch, &head_branch, &previous_head_oid, plan)?
                };
                push_plan.add(&base_oid, &base_branch, false);
                (Some(base_oid), head_oid)
            }
            Mode::Direct => {
                let head_oid = if plan.is_new {
                    new_diff_direct(git, &previous_head_oid, plan)?
                } else {
                    update_diff_direct(git, &config.remote, &head_branch, &previous_head_oid, plan)?
                };
                (None, head_oid)
            }
        };
        if let Some(base_oid) = &base_oid {
            git.update_local_ref(&base_branch, base_oid, None)?;
        }
        git.update_local_ref(&head_branch, &head_oid, None)?;

        push_plan.add(&head_oid, &head_branch, false);
        push_plan.add(&plan.commit.oid, &orig_branch, true);

        previous_head_branch = head_branch.clone();
        previous_head_oid = head_oid.clone();

        let source_id = commit_msg::compute_source_id(
            git_hash_kind(),
            &plan.commit.tree.to_string(),
            &plan.prose,
            &plan.user_trailers,
        )?;

        let title = title_line(&plan.prose);
        let known_pr_numbers: Vec<Option<u64>> = plans.iter().map(|p| p.pr_number).collect();

        let (pr_number, action) = if plan.is_new {
            // Body is rendered without this PR's own number, then
            // re-rendered once the forge assigns one; siblings that are
            // also new won't appear in this round's navigator block until
            // the next submit, as noted in `stack_refs_for`.
            let stack_refs = stack_refs_for(config, &known_pr_numbers);
            let placeholder_body = pr_body::render(&stack_refs, 0, &plan.prose);
            let created = forge.create_pr(
                &config.owner,
                &config.repo,
                &NewPr {
                    head_ref: head_branch.clone(),
                    base_ref: base_branch.clone(),
                    title: title.clone(),
                    body: placeholder_body,
                },
            )?;
            let stack_refs = stack_refs_for(config, &known_pr_numbers);
            let final_body = pr_body::render(&stack_refs, created.number, &plan.prose);
            forge.update_pr(
                &config.owner,
                &config.repo,
                created.number,
                &PrUpdate {
                    base_ref: None,
                    title: None,
                    body: Some(final_body),
                },
            )?;
            (created.number, SubmitAction::Created)
        } else {
            let pr_number = plan.pr_number.expect("update implies a known pr");
            let stack_refs = stack_refs_for(config, &known_pr_numbers);
            let body = pr_body::render(&stack_refs, pr_number, &plan.prose);
            let update = PrUpdate {
                base_ref: Some(base_branch.clone()),
                title: config.update_fields.then(|| title.clone()),
                body: Some(body),
            };
            forge.update_pr(&config.owner, &config.repo, pr_number, &update)?;
            (pr_number, SubmitAction::Updated)
        };

        results.push(SubmitResultRow {
            ghnum: plan.ghnum,
            pr_number,
            pr_url: pr_url(config, pr_number),
            action,
        });

        let new_trailers = GhstackTrailers {
            source_id: Some(source_id),
            comment_id: None,
            pr_url: Some(format!("{}/pull/{pr_number}", repo_url(config))),
            direct: matches!(config.mode, Mode::Direct),
        };
        let new_message = commit_msg::emit(&plan.prose, &plan.user_trailers, &new_trailers);
        rewrites.push((plan.commit.oid.clone(), new_message));
    }

    if !config.dry_run {
        git.push(&config.remote, &push_plan.refspecs, &push_plan.force_refs)?;
        if !rewrites.is_empty() {
            git.rewrite_messages(&rewrites)?;
        }
    }

    Ok(results)
}

fn repo_url(config: &Config) -> String {
    format!("https://github.com/{}/{}", config.owner, config.repo)
}

/// Builds the navigator block's PR list, top of stack first. A sibling
/// whose PR number isn't known yet (not yet created on the forge) is
/// omitted; it will be added to every other PR's navigator block on the
/// next submit, once its own creation has assigned it a number.
fn stack_refs_for(config: &Config, known_pr_numbers: &[Option<u64>]) -> Vec<u64> {
    match config.mode {
        Mode::Direct => Vec::new(),
        Mode::Stack => {
            let mut refs: Vec<u64> = known_pr_numbers.iter().filter_map(|n| *n).collect();
            refs.reverse();
            refs
        }
    }
}

fn pr_url(config: &Config, number: u64) -> String {
    format!("https://github.com/{}/{}/pull/{number}", config.owner, config.repo)
}

fn title_line(prose: &str) -> String {
    prose.lines().next().unwrap_or("").to_string()
}

fn git_hash_kind() -> gix::hash::Kind {
    gix::hash::Kind::Sha1
}

/// New diff, stack mode (spec.md §4.5 "New diff (stack mode)"). Synthesizes
/// a `base` commit whose tree is `remote_base`'s own tree (a "base update"
/// marker decoupling PR history from trunk history) and a `head` commit
/// whose tree is the local commit's, parented on `(base, remote_base)` so
/// its diff against `base` is exactly the user's change.
fn new_diff_stack(git: &dyn Git, remote_base: &Oid, plan: &Plan) -> Result<(Oid, Oid)> {
    let remote_base_tree = git.commit_info(remote_base)?.tree;
    let base_oid = git.create_commit(
        &remote_base_tree,
        &[remote_base.clone()],
        &plan.commit.author,
        &plan.commit.committer,
        "Update base for Ghstack diff",
    )?;
    let head_oid = git.create_commit(
        &plan.commit.tree,
        &[base_oid.clone(), remote_base.clone()],
        &plan.commit.author,
        &plan.commit.committer,
        &plan.commit.message,
    )?;
    Ok((base_oid, head_oid))
}

/// Update, stack mode (spec.md §4.5 "Update (stack mode)"). Advances `base`
/// with a merge of its prior tip and the new predecessor `head` only if the
/// predecessor's tree actually moved, then advances `head` with a merge of
/// its prior tip (and the new `base`, if it advanced) carrying the new
/// local tree — so both pushes land as fast-forwards.
fn update_diff_stack(
    git: &dyn Git,
    remote: &str,
    base_branch: &str,
    head_branch: &str,
    remote_base: &Oid,
    plan: &Plan,
) -> Result<(Oid, Oid)> {
    let old_base = forge::remote_tracking_oid(git, remote, base_branch).ok_or_else(|| GhstackError::InvariantViolation {
        what: format!("expected remote-tracking ref for {base_branch} to be fetched"),
        diagnostics: String::new(),
    })?;
    let old_head = forge::remote_tracking_oid(git, remote, head_branch).ok_or_else(|| GhstackError::InvariantViolation {
        what: format!("expected remote-tracking ref for {head_branch} to be fetched"),
        diagnostics: String::new(),
    })?;

    let old_base_tree = git.commit_info(&old_base)?.tree;
    let remote_base_tree = git.commit_info(remote_base)?.tree;
    let base_advanced = old_base_tree != remote_base_tree;

    let base_oid = if base_advanced {
        git.create_commit(
            &remote_base_tree,
            &[old_base, remote_base.clone()],
            &plan.commit.author,
            &plan.commit.committer,
            "Update base for Ghstack diff",
        )?
    } else {
        old_base
    };

    let head_parents: Vec<Oid> = if base_advanced {
        vec![old_head, base_oid.clone()]
    } else {
        vec![old_head]
    };
    let head_oid = git.create_commit(
        &plan.commit.tree,
        &head_parents,
        &plan.commit.author,
        &plan.commit.committer,
        &plan.commit.message,
    )?;
    Ok((base_oid, head_oid))
}

/// New diff, direct mode (spec.md §4.5 "New diff (direct mode)"): the local
/// commit rebased onto `remote_base`, or reused unchanged if it's already a
/// direct child of it.
fn new_diff_direct(git: &dyn Git, remote_base: &Oid, plan: &Plan) -> Result<Oid> {
    if plan.commit.parents.first() == Some(remote_base) {
        return Ok(plan.commit.oid.clone());
    }
    git.create_commit(
        &plan.commit.tree,
        &[remote_base.clone()],
        &plan.commit.author,
        &plan.commit.committer,
        &plan.commit.message,
    )
}

/// Update, direct mode (spec.md §4.5 "Update (direct mode)"): a single new
/// commit on `head` whose tree is the new local tree and whose parents are
/// the current `head` tip, plus the new `remote_base` as a second parent if
/// the predecessor changed since the last push.
fn update_diff_direct(git: &dyn Git, remote: &str, head_branch: &str, remote_base: &Oid, plan: &Plan) -> Result<Oid> {
    let old_head = forge::remote_tracking_oid(git, remote, head_branch).ok_or_else(|| GhstackError::InvariantViolation {
        what: format!("expected remote-tracking ref for {head_branch} to be fetched"),
        diagnostics: String::new(),
    })?;
    let old_head_info = git.commit_info(&old_head)?;
    let base_changed = old_head_info.second_parent() != Some(remote_base);

    let mut parents = vec![old_head];
    if base_changed {
        parents.push(remote_base.clone());
    }
    git.create_commit(&plan.commit.tree, &parents, &plan.commit.author, &plan.commit.committer, &plan.commit.message)
}
