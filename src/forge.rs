//! The `Forge` capability (spec.md §1, §6): everything ghstack needs from
//! GitHub's PR API, abstracted so the engine never depends on `octocrab`
//! directly.
//!
//! Queries are meant to be gathered and issued as one batch per submit
//! (spec.md §9's "collect-then-dispatch" pattern) rather than one
//! round-trip per commit; `get_prs_by_number` exists for that reason.

use std::collections::HashMap;

use crate::error::{GhstackError, Result};
use crate::ghnum::{self, BranchKind};
use crate::git::Git;

/// The forge-side facts about one PR that the classifier and renderer
/// need. Deliberately flat: this is not `octocrab`'s `PullRequest`, it's
/// the slice of it ghstack actually consults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrInfo {
    pub number: u64,
    pub closed: bool,
    /// `true` once the PR's head branch no longer exists on the remote —
    /// distinguishes "closed, landed cleanly" from "closed, branch still
    /// there" (spec.md §4.4, §7).
    pub branch_deleted: bool,
    /// The `ghstack-source-id` that was present on the tip commit the last
    /// time this PR's `head` branch was pushed.
    pub last_source_id: Option<String>,
    pub title: String,
    pub body: String,
    pub base_ref: String,
    pub head_ref: String,
}

#[derive(Debug, Clone)]
pub struct NewPr {
    pub head_ref: String,
    pub base_ref: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct PrUpdate {
    pub base_ref: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

pub trait Forge {
    /// Fetches PR metadata for every open-or-recently-closed PR headed by
    /// a `gh/<username>/*` branch, in one request. The engine builds its
    /// ghnum -> PrInfo map from this rather than querying per-commit.
    fn list_prs_by_head_prefix(&self, owner: &str, repo: &str, head_prefix: &str) -> Result<Vec<PrInfo>>;

    fn get_pr(&self, owner: &str, repo: &str, number: u64) -> Result<PrInfo>;

    fn create_pr(&self, owner: &str, repo: &str, new: &NewPr) -> Result<PrInfo>;

    fn update_pr(&self, owner: &str, repo: &str, number: u64, update: &PrUpdate) -> Result<()>;

    fn close_pr(&self, owner: &str, repo: &str, number: u64) -> Result<()>;

    fn highest_known_ghnum(&self, owner: &str, repo: &str, username: &str) -> Result<u64>;
}

/// Builds the ghnum -> PrInfo map the classifier consumes, from a single
/// batched forge query for the PR metadata itself (spec.md §9), plus one
/// `git fetch` per ghnum to read the facts the REST PR payload doesn't
/// carry: the last-written `ghstack-source-id` (read off the tip of
/// `<remote>/gh/<user>/<n>/orig`, spec.md §4.4) and whether the PR's `head`
/// branch still exists on the remote (spec.md §4.4's closed-PR tie-break).
/// `base` is fetched too so the submission engine (spec.md §4.5's "Update"
/// steps) can read the forge's current `base`/`head` tips as
/// remote-tracking refs without fetching them again itself.
pub fn fetch_remote_prs(
    forge: &dyn Forge,
    git: &dyn Git,
    remote: &str,
    owner: &str,
    repo: &str,
    username: &str,
) -> Result<HashMap<u64, PrInfo>> {
    let prefix = format!("gh/{username}/");
    let prs = forge.list_prs_by_head_prefix(owner, repo, &prefix)?;
    let mut out = HashMap::new();
    for mut pr in prs {
        let Some(ghnum) = ghnum::parse_branch_name(&pr.head_ref).map(|b| b.ghnum) else {
            continue;
        };
        let orig_branch = ghnum::branch_name(username, ghnum, BranchKind::Orig);
        let head_branch = ghnum::branch_name(username, ghnum, BranchKind::Head);
        let base_branch = ghnum::branch_name(username, ghnum, BranchKind::Base);

        // Best-effort: each branch is fetched on its own so a branch that's
        // already gone (e.g. closed-and-deleted) doesn't abort the fetch of
        // its siblings.
        let _ = git.fetch(remote, &[orig_branch.clone()]);
        pr.last_source_id = remote_tracking_source_id(git, remote, &orig_branch);

        // If the remote no longer has this ref at all, `fetch` itself
        // fails — that's the authoritative signal the branch is gone.
        pr.branch_deleted = git.fetch(remote, &[head_branch.clone()]).is_err();

        let _ = git.fetch(remote, &[base_branch]);

        out.insert(ghnum, pr);
    }
    Ok(out)
}

/// Reads the oid a remote-tracking ref for `branch` currently points at, if
/// it's been fetched. Used by the submission engine to recover the forge's
/// current `base`/`head` tips without a second round of fetches.
pub fn remote_tracking_oid(git: &dyn Git, remote: &str, branch: &str) -> Option<crate::git::Oid> {
    git.try_resolve(&format!("refs/remotes/{remote}/{branch}")).ok().flatten()
}

fn remote_tracking_source_id(git: &dyn Git, remote: &str, branch: &str) -> Option<String> {
    let oid = remote_tracking_oid(git, remote, branch)?;
    let info = git.commit_info(&oid).ok()?;
    crate::commit_msg::parse(&info.message).ghstack.source_id
}

/// `octocrab`-backed implementation. Network calls are issued through
/// `tokio`'s current-thread runtime since the rest of the engine is
/// synchronous; ghstack's CLI is not meant to run concurrent submits.
pub struct OctocrabForge {
    client: octocrab::Octocrab,
    runtime: tokio::runtime::Runtime,
}

impl OctocrabForge {
    pub fn new(token: String) -> Result<Self> {
        let mut builder = octocrab::OctocrabBuilder::new().personal_token(token);
        // Integration tests point this at a local mock server instead of
        // the real GitHub API.
        if let Ok(base_uri) = std::env::var("GHSTACK_GITHUB_API_URL") {
            builder = builder.base_uri(base_uri).map_err(|e| GhstackError::ForgePermanent {
                forge: "github".to_string(),
                message: e.to_string(),
            })?;
        }
        let client = builder.build().map_err(|e| GhstackError::ForgePermanent {
            forge: "github".to_string(),
            message: e.to_string(),
        })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GhstackError::ForgePermanent {
                forge: "github".to_string(),
                message: e.to_string(),
            })?;
        Ok(OctocrabForge { client, runtime })
    }

    fn map_err(forge: &str, e: octocrab::Error) -> GhstackError {
        match &e {
            octocrab::Error::GitHub { source, .. } if source.status_code.is_client_error() => {
                GhstackError::ForgePermanent {
                    forge: forge.to_string(),
                    message: e.to_string(),
                }
            }
            _ => GhstackError::ForgeTransient {
                forge: forge.to_string(),
                message: e.to_string(),
            },
        }
    }

    fn to_pr_info(pr: octocrab::models::pulls::PullRequest) -> PrInfo {
        let closed = pr.state.map(|s| !matches!(s, octocrab::models::IssueState::Open))
            .unwrap_or(pr.closed_at.is_some());
        PrInfo {
            number: pr.number,
            closed,
            branch_deleted: false,
            last_source_id: None,
            title: pr.title.unwrap_or_default(),
            body: pr.body.unwrap_or_default(),
            base_ref: pr.base.ref_field,
            head_ref: pr.head.ref_field,
        }
    }
}

impl Forge for OctocrabForge {
    fn list_prs_by_head_prefix(&self, owner: &str, repo: &str, head_prefix: &str) -> Result<Vec<PrInfo>> {
        self.runtime.block_on(async {
            let page = self
                .client
                .pulls(owner, repo)
                .list()
                .state(octocrab::params::State::All)
                .per_page(100)
                .send()
                .await
                .map_err(|e| Self::map_err("github", e))?;
            Ok(page
                .items
                .into_iter()
                .filter(|pr| pr.head.ref_field.starts_with(head_prefix))
                .map(Self::to_pr_info)
                .collect())
        })
    }

    fn get_pr(&self, owner: &str, repo: &str, number: u64) -> Result<PrInfo> {
        self.runtime.block_on(async {
            let pr = self
                .client
                .pulls(owner, repo)
                .get(number)
                .await
                .map_err(|e| Self::map_err("github", e))?;
            Ok(Self::to_pr_info(pr))
        })
    }

    fn create_pr(&self, owner: &str, repo: &str, new: &NewPr) -> Result<PrInfo> {
        self.runtime.block_on(async {
            let pr = self
                .client
                .pulls(owner, repo)
                .create(&new.title, &new.head_ref, &new.base_ref)
                .body(&new.body)
                .send()
                .await
                .map_err(|e| Self::map_err("github", e))?;
            Ok(Self::to_pr_info(pr))
        })
    }

    fn update_pr(&self, owner: &str, repo: &str, number: u64, update: &PrUpdate) -> Result<()> {
        self.runtime.block_on(async {
            let binding = self.client.pulls(owner, repo);
            let mut req = binding.update(number);
            if let Some(title) = &update.title {
                req = req.title(title);
            }
            if let Some(body) = &update.body {
                req = req.body(body);
            }
            if let Some(base) = &update.base_ref {
                req = req.base(base);
            }
            req.send().await.map_err(|e| Self::map_err("github", e))?;
            Ok(())
        })
    }

    fn close_pr(&self, owner: &str, repo: &str, number: u64) -> Result<()> {
        self.runtime.block_on(async {
            self.client
                .pulls(owner, repo)
                .update(number)
                .state(octocrab::params::pulls::State::Closed)
                .send()
                .await
                .map_err(|e| Self::map_err("github", e))?;
            Ok(())
        })
    }

    fn highest_known_ghnum(&self, owner: &str, repo: &str, username: &str) -> Result<u64> {
        let prefix = format!("gh/{username}/");
        let prs = self.list_prs_by_head_prefix(owner, repo, &prefix)?;
        Ok(prs
            .iter()
            .filter_map(|pr| crate::ghnum::parse_branch_name(&pr.head_ref).map(|b| b.ghnum))
            .max()
            .unwrap_or(0))
    }
}
