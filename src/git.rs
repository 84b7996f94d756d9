//! The `Git` capability (spec.md §1, §6): an abstraction over the handful
//! of plumbing operations the engine needs. Implemented here on top of
//! `gix` for in-process reads/writes and a `git` subprocess for `push`
//! and `fetch`, which still need to speak to a real remote.

use crate::cmd;
use crate::error::{GhstackError, Result};
use crate::util::CommandExt as _;

/// A content hash, represented as lowercase hex. Kept as a plain string at
/// the trait boundary so the engine and its tests don't need to depend on
/// `gix`'s object-id type directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(pub String);

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<gix::ObjectId> for Oid {
    fn from(id: gix::ObjectId) -> Self {
        Oid(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the epoch.
    pub time: i64,
    /// Offset from UTC in seconds.
    pub offset: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub oid: Oid,
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl CommitInfo {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn second_parent(&self) -> Option<&Oid> {
        self.parents.get(1)
    }
}

/// The abstract Git capability consumed by the engine (spec.md §6).
///
/// Every method is side-effecting but idempotent at the level of final
/// state: calling `update_ref` twice with the same target is a no-op the
/// second time, `push` of an already-up-to-date ref succeeds trivially,
/// etc.
pub trait Git {
    fn resolve(&self, rev: &str) -> Result<Oid>;
    fn try_resolve(&self, rev: &str) -> Result<Option<Oid>>;

    /// Commits from `merge_base(head, base)..head`, oldest first
    /// (spec.md §4.3 step 1).
    fn commits_between(&self, base: &Oid, head: &Oid) -> Result<Vec<CommitInfo>>;

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>>;

    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo>;

    /// Creates a new commit object without touching any ref.
    fn create_commit(
        &self,
        tree: &Oid,
        parents: &[Oid],
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Oid>;

    /// Points `refs/heads/<name>` at `target`. `expect_old` is a
    /// compare-and-swap guard: `Some(oid)` requires the ref currently be at
    /// `oid` (or absent, if `oid` is the null id); `None` allows any
    /// current value, including creating the ref fresh.
    fn update_local_ref(&self, name: &str, target: &Oid, expect_old: Option<&Oid>) -> Result<()>;

    fn resolve_local_ref(&self, name: &str) -> Result<Option<Oid>>;

    /// Lists refs under `refs/heads/<prefix>` as `(short_name, oid)`.
    fn for_each_local_branch(&self, prefix: &str) -> Result<Vec<(String, Oid)>>;

    /// Pushes `refspecs` (`"<oid>:refs/heads/<name>"` form) to `remote`.
    /// Only entries in `force_refs` (by destination ref name) may be
    /// force-pushed — enforces invariant 2 from spec.md §3 (`head`/`base`
    /// never force-updated; only `orig` may be).
    fn push(&self, remote: &str, refspecs: &[String], force_refs: &[String]) -> Result<()>;

    fn fetch(&self, remote: &str, refs: &[String]) -> Result<()>;

    fn delete_remote_branch(&self, remote: &str, name: &str) -> Result<()>;

    /// Rewrites the given local commits in place (used by `unlink`, which
    /// is the only operation permitted to mutate the user's checkout).
    /// `commits` is `(old_oid, new_message)` oldest first; the first
    /// commit's parent is preserved, each subsequent one is re-parented
    /// onto the previous rewritten commit, and the branch HEAD is fast
    /// forwarded onto the new tip.
    fn rewrite_messages(&self, commits: &[(Oid, String)]) -> Result<Oid>;

    fn head_branch_name(&self) -> Result<Option<String>>;
}

pub struct GixGit {
    repo: gix::Repository,
}

impl GixGit {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let repo = gix::open(path).map_err(|e| GhstackError::Git {
            command: "open".to_string(),
            stderr: e.to_string(),
        })?;
        Ok(GixGit { repo })
    }

    fn object_hash(&self) -> gix::hash::Kind {
        self.repo.object_hash()
    }

    fn gix_commit_to_info(&self, commit: gix::Commit<'_>) -> Result<CommitInfo> {
        let to_err = |e: gix::objs::decode::Error| GhstackError::Git {
            command: "cat-file".to_string(),
            stderr: e.to_string(),
        };
        let decoded = commit.decode().map_err(to_err)?;
        let message = decoded.message.to_string();
        let author = to_signature(&decoded.author);
        let committer = to_signature(&decoded.committer);
        let parents = decoded.parents().map(Oid::from).collect();
        Ok(CommitInfo {
            oid: commit.id.into(),
            tree: decoded.tree().into(),
            parents,
            author,
            committer,
            message,
        })
    }
}

fn to_signature(sig: &gix::actor::SignatureRef<'_>) -> Signature {
    Signature {
        name: sig.name.to_string(),
        email: sig.email.to_string(),
        time: sig.time().expect("valid signature timestamp").seconds,
        offset: sig.time().expect("valid signature timestamp").offset,
    }
}

impl Git for GixGit {
    fn resolve(&self, rev: &str) -> Result<Oid> {
        self.repo
            .rev_parse_single(rev)
            .map(|id| Oid::from(id.detach()))
            .map_err(|e| GhstackError::Git {
                command: format!("rev-parse {rev}"),
                stderr: e.to_string(),
            })
    }

    fn try_resolve(&self, rev: &str) -> Result<Option<Oid>> {
        match self.repo.rev_parse_single(rev) {
            Ok(id) => Ok(Some(Oid::from(id.detach()))),
            Err(_) => Ok(None),
        }
    }

    fn commits_between(&self, base: &Oid, head: &Oid) -> Result<Vec<CommitInfo>> {
        let head_id = gix::ObjectId::from_hex(head.0.as_bytes()).map_err(|e| GhstackError::Git {
            command: "rev-list".to_string(),
            stderr: e.to_string(),
        })?;
        let base_id = gix::ObjectId::from_hex(base.0.as_bytes()).map_err(|e| GhstackError::Git {
            command: "rev-list".to_string(),
            stderr: e.to_string(),
        })?;

        let walk = self
            .repo
            .rev_walk([head_id])
            .all()
            .map_err(|e| GhstackError::Git {
                command: "rev-list".to_string(),
                stderr: e.to_string(),
            })?;

        let mut commits = Vec::new();
        for info in walk {
            let info = info.map_err(|e| GhstackError::Git {
                command: "rev-list".to_string(),
                stderr: e.to_string(),
            })?;
            if info.id == base_id {
                break;
            }
            let commit = info.object().map_err(|e| GhstackError::Git {
                command: "cat-file".to_string(),
                stderr: e.to_string(),
            })?;
            commits.push(self.gix_commit_to_info(commit)?);
        }
        commits.reverse();
        Ok(commits)
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>> {
        let a_id = gix::ObjectId::from_hex(a.0.as_bytes()).map_err(|e| GhstackError::Git {
            command: "merge-base".to_string(),
            stderr: e.to_string(),
        })?;
        let b_id = gix::ObjectId::from_hex(b.0.as_bytes()).map_err(|e| GhstackError::Git {
            command: "merge-base".to_string(),
            stderr: e.to_string(),
        })?;
        match self.repo.merge_base(a_id, b_id) {
            Ok(id) => Ok(Some(Oid::from(id.detach()))),
            Err(_) => Ok(None),
        }
    }

    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo> {
        let id = gix::ObjectId::from_hex(oid.0.as_bytes()).map_err(|e| GhstackError::Git {
            command: "cat-file".to_string(),
            stderr: e.to_string(),
        })?;
        let commit = self.repo.find_commit(id).map_err(|e| GhstackError::Git {
            command: "cat-file".to_string(),
            stderr: e.to_string(),
        })?;
        self.gix_commit_to_info(commit)
    }

    fn create_commit(
        &self,
        tree: &Oid,
        parents: &[Oid],
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Oid> {
        let tree_id = gix::ObjectId::from_hex(tree.0.as_bytes()).map_err(|e| GhstackError::Git {
            command: "commit-tree".to_string(),
            stderr: e.to_string(),
        })?;
        let parent_ids: Vec<gix::ObjectId> = parents
            .iter()
            .map(|p| {
                gix::ObjectId::from_hex(p.0.as_bytes()).map_err(|e| GhstackError::Git {
                    command: "commit-tree".to_string(),
                    stderr: e.to_string(),
                })
            })
            .collect::<Result<_>>()?;

        let author_sig = gix::actor::Signature {
            name: author.name.clone().into(),
            email: author.email.clone().into(),
            time: gix::date::Time::new(author.time, author.offset),
        };
        let committer_sig = gix::actor::Signature {
            name: committer.name.clone().into(),
            email: committer.email.clone().into(),
            time: gix::date::Time::new(committer.time, committer.offset),
        };

        let commit = gix::objs::Commit {
            tree: tree_id,
            parents: parent_ids.into(),
            author: author_sig,
            committer: committer_sig,
            encoding: None,
            message: message.into(),
            extra_headers: Vec::new(),
        };

        let oid = self.repo.write_object(commit).map_err(|e| GhstackError::Git {
            command: "commit-tree".to_string(),
            stderr: e.to_string(),
        })?;
        Ok(Oid::from(oid.detach()))
    }

    fn update_local_ref(&self, name: &str, target: &Oid, expect_old: Option<&Oid>) -> Result<()> {
        let target_id = gix::ObjectId::from_hex(target.0.as_bytes()).map_err(|e| GhstackError::Git {
            command: "update-ref".to_string(),
            stderr: e.to_string(),
        })?;
        let full = format!("refs/heads/{name}");
        let previous = match expect_old {
            Some(old) => {
                let old_id =
                    gix::ObjectId::from_hex(old.0.as_bytes()).map_err(|e| GhstackError::Git {
                        command: "update-ref".to_string(),
                        stderr: e.to_string(),
                    })?;
                gix::refs::transaction::PreviousValue::MustExistAndMatch(old_id.into())
            }
            None => gix::refs::transaction::PreviousValue::Any,
        };
        self.repo
            .reference(full, target_id, previous, format!("ghstack: update {name}"))
            .map_err(|e| GhstackError::Git {
                command: format!("update-ref {name}"),
                stderr: e.to_string(),
            })?;
        Ok(())
    }

    fn resolve_local_ref(&self, name: &str) -> Result<Option<Oid>> {
        self.try_resolve(&format!("refs/heads/{name}"))
    }

    fn for_each_local_branch(&self, prefix: &str) -> Result<Vec<(String, Oid)>> {
        let platform = self.repo.references().map_err(|e| GhstackError::Git {
            command: "for-each-ref".to_string(),
            stderr: e.to_string(),
        })?;
        let full_prefix = format!("refs/heads/{prefix}");
        let mut out = Vec::new();
        let iter = platform.all().map_err(|e| GhstackError::Git {
            command: "for-each-ref".to_string(),
            stderr: e.to_string(),
        })?;
        for r in iter {
            let mut r = r.map_err(|e| GhstackError::Git {
                command: "for-each-ref".to_string(),
                stderr: e.to_string(),
            })?;
            let full_name = r.name().as_bstr().to_string();
            if let Some(short) = full_name.strip_prefix(&full_prefix) {
                let id = r.peel_to_id_in_place().map_err(|e| GhstackError::Git {
                    command: "for-each-ref".to_string(),
                    stderr: e.to_string(),
                })?;
                out.push((short.trim_start_matches('/').to_string(), Oid::from(id.detach())));
            }
        }
        Ok(out)
    }

    fn push(&self, remote: &str, refspecs: &[String], force_refs: &[String]) -> Result<()> {
        if refspecs.is_empty() {
            return Ok(());
        }
        let mut args = vec!["push".to_string(), "--atomic".to_string()];
        for spec in refspecs {
            let dest = spec.split(':').nth(1).unwrap_or("");
            let forced = force_refs.iter().any(|f| dest.ends_with(f.as_str()));
            if forced {
                args.push(format!("--force-with-lease={dest}"));
            }
        }
        args.push(remote.to_string());
        args.extend(refspecs.iter().cloned());

        cmd!("git", ...args).run_checked(&format!("push {remote}"))?;
        Ok(())
    }

    fn fetch(&self, remote: &str, refs: &[String]) -> Result<()> {
        if refs.is_empty() {
            cmd!("git fetch", remote).run_checked("fetch")?;
        } else {
            let mut args = vec!["fetch".to_string(), remote.to_string()];
            args.extend(refs.iter().cloned());
            cmd!("git", ...args).run_checked("fetch")?;
        }
        Ok(())
    }

    fn delete_remote_branch(&self, remote: &str, name: &str) -> Result<()> {
        cmd!("git push", remote, (":refs/heads/{name}")).run_checked("delete-branch")?;
        Ok(())
    }

    fn rewrite_messages(&self, commits: &[(Oid, String)]) -> Result<Oid> {
        let mut parent: Option<Oid> = None;
        let mut last = None;
        for (old_oid, new_message) in commits {
            let info = self.commit_info(old_oid)?;
            let parents = match &parent {
                Some(p) => vec![p.clone()],
                None => info.parents.clone(),
            };
            let new_oid =
                self.create_commit(&info.tree, &parents, &info.author, &info.committer, new_message)?;
            parent = Some(new_oid.clone());
            last = Some(new_oid);
        }
        let tip = last.ok_or_else(|| GhstackError::InvariantViolation {
            what: "rewrite_messages called with no commits".to_string(),
            diagnostics: String::new(),
        })?;

        if let Some(branch) = self.head_branch_name()? {
            self.update_local_ref(&branch, &tip, None)?;
        }
        Ok(tip)
    }

    fn head_branch_name(&self) -> Result<Option<String>> {
        let head = self.repo.head().map_err(|e| GhstackError::Git {
            command: "symbolic-ref HEAD".to_string(),
            stderr: e.to_string(),
        })?;
        Ok(head.referent_name().map(|n| n.shorten().to_string()))
    }
}

/// A batch of refspecs to push together, grouped by whether the
/// destination ref is allowed to be force-updated.
#[derive(Debug, Default, Clone)]
pub struct PushPlan {
    pub refspecs: Vec<String>,
    pub force_refs: Vec<String>,
}

impl PushPlan {
    pub fn add(&mut self, oid: &Oid, dest_branch: &str, force: bool) {
        self.refspecs.push(format!("{oid}:refs/heads/{dest_branch}"));
        if force {
            self.force_refs.push(dest_branch.to_string());
        }
    }
}
