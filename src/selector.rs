//! Stack selector (spec.md §4.3): turns "HEAD and a base ref" into the
//! ordered list of commits ghstack will operate on, or rejects the
//! request outright.

use crate::config::Config;
use crate::error::{GhstackError, Result};
use crate::git::{CommitInfo, Git, Oid};
use crate::ghnum;

/// The ordered, validated stack: bottom of stack (oldest) first.
#[derive(Debug, Clone)]
pub struct Stack {
    pub base: Oid,
    pub commits: Vec<CommitInfo>,
}

impl Stack {
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// Walks `merge_base(head, base)..head`, validates the result against the
/// invariants in spec.md §4.3 and §5, and returns the ordered stack.
///
/// Rejections, per spec.md §4.3:
/// - empty range -> `EmptyStack`
/// - longer than `config.max_stack_len` (unless `config.force`) -> `StackTooLong`
/// - any commit is a merge whose second parent lands on a `gh/*/head` or
///   `gh/*/base` branch ("poisoned head", meaning a previous ghstack
///   submit's synthetic merge wasn't properly linearized away) -> `PoisonedHead`
pub fn select_stack(git: &dyn Git, config: &Config, head_rev: &str) -> Result<Stack> {
    let head = git.resolve(head_rev)?;
    let base = git.resolve(&config.default_branch)?;

    let merge_base = git
        .merge_base(&base, &head)?
        .ok_or_else(|| GhstackError::InvariantViolation {
            what: format!("no merge base between {head_rev} and {}", config.default_branch),
            diagnostics: String::new(),
        })?;

    let commits = git.commits_between(&merge_base, &head)?;

    if commits.is_empty() {
        return Err(GhstackError::EmptyStack);
    }

    if commits.len() > config.max_stack_len && !config.force {
        return Err(GhstackError::StackTooLong {
            len: commits.len(),
            limit: config.max_stack_len,
        });
    }

    for commit in &commits {
        check_not_poisoned(git, commit)?;
    }

    Ok(Stack {
        base: merge_base,
        commits,
    })
}

/// Like [`select_stack`], but additionally applies spec.md §4.3 step 4:
/// if `only` is non-empty, the caller has named a revision subset
/// (`ghstack submit <rev>...`) and only those commits participate, even
/// though the full stack is still walked and validated first.
pub fn select_stack_restricted(git: &dyn Git, config: &Config, head_rev: &str, only: &[String]) -> Result<Stack> {
    let stack = select_stack(git, config, head_rev)?;
    if only.is_empty() {
        return Ok(stack);
    }
    let mut keep = Vec::with_capacity(only.len());
    for rev in only {
        keep.push(git.resolve(rev)?);
    }
    Ok(restrict_to(&stack, &keep))
}

/// Restricts an already-selected stack to the commits reachable from
/// `revs` (spec.md §4.3 "optional subset restriction" — e.g. `ghstack
/// submit HEAD~2`). Commits are matched by oid; anything not named stays
/// out of the returned stack but the original ordering is preserved.
pub fn restrict_to(stack: &Stack, keep: &[Oid]) -> Stack {
    let commits = stack
        .commits
        .iter()
        .filter(|c| keep.contains(&c.oid))
        .cloned()
        .collect();
    Stack {
        base: stack.base.clone(),
        commits,
    }
}

fn check_not_poisoned(git: &dyn Git, commit: &CommitInfo) -> Result<()> {
    if !commit.is_merge() {
        return Ok(());
    }
    let Some(second_parent) = commit.second_parent() else {
        return Ok(());
    };
    let branches = git.for_each_local_branch("")?;
    for (name, oid) in branches {
        if &oid != second_parent {
            continue;
        }
        if let Some(parsed) = ghnum::parse_branch_name(&name) {
            match parsed.kind {
                ghnum::BranchKind::Head | ghnum::BranchKind::Base => {
                    return Err(GhstackError::PoisonedHead {
                        oid: commit.oid.to_string(),
                    });
                }
                ghnum::BranchKind::Orig => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Signature;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeGit {
        refs: RefCell<HashMap<String, Oid>>,
        commits: RefCell<HashMap<Oid, CommitInfo>>,
        chain: Vec<Oid>, // oldest..newest, including the base as chain[0]
    }

    fn sig(name: &str) -> Signature {
        Signature {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            time: 0,
            offset: 0,
        }
    }

    fn oid(s: &str) -> Oid {
        Oid(s.to_string())
    }

    impl FakeGit {
        fn linear(n: usize) -> Self {
            let g = FakeGit::default();
            let mut prev: Option<Oid> = None;
            let mut chain = Vec::new();
            for i in 0..=n {
                let id = oid(&format!("c{i}"));
                let parents = prev.clone().into_iter().collect::<Vec<_>>();
                g.commits.borrow_mut().insert(
                    id.clone(),
                    CommitInfo {
                        oid: id.clone(),
                        tree: oid(&format!("t{i}")),
                        parents,
                        author: sig("alice"),
                        committer: sig("alice"),
                        message: format!("commit {i}"),
                    },
                );
                chain.push(id.clone());
                prev = Some(id);
            }
            g.refs.borrow_mut().insert("main".to_string(), chain[0].clone());
            g.refs
                .borrow_mut()
                .insert("head".to_string(), chain.last().unwrap().clone());
            FakeGit {
                refs: g.refs,
                commits: g.commits,
                chain,
            }
        }
    }

    impl Git for FakeGit {
        fn resolve(&self, rev: &str) -> Result<Oid> {
            self.refs
                .borrow()
                .get(rev)
                .cloned()
                .ok_or_else(|| GhstackError::Git {
                    command: "resolve".to_string(),
                    stderr: format!("unknown rev {rev}"),
                })
        }
        fn try_resolve(&self, rev: &str) -> Result<Option<Oid>> {
            Ok(self.refs.borrow().get(rev).cloned())
        }
        fn commits_between(&self, base: &Oid, head: &Oid) -> Result<Vec<CommitInfo>> {
            let start = self.chain.iter().position(|o| o == base).unwrap_or(0);
            let end = self.chain.iter().position(|o| o == head).unwrap();
            Ok(self.chain[start + 1..=end]
                .iter()
                .map(|o| self.commits.borrow()[o].clone())
                .collect())
        }
        fn merge_base(&self, a: &Oid, _b: &Oid) -> Result<Option<Oid>> {
            Ok(Some(a.clone()))
        }
        fn commit_info(&self, oid: &Oid) -> Result<CommitInfo> {
            Ok(self.commits.borrow()[oid].clone())
        }
        fn create_commit(
            &self,
            _tree: &Oid,
            _parents: &[Oid],
            _author: &Signature,
            _committer: &Signature,
            _message: &str,
        ) -> Result<Oid> {
            unimplemented!()
        }
        fn update_local_ref(&self, _name: &str, _target: &Oid, _expect_old: Option<&Oid>) -> Result<()> {
            unimplemented!()
        }
        fn resolve_local_ref(&self, _name: &str) -> Result<Option<Oid>> {
            Ok(None)
        }
        fn for_each_local_branch(&self, _prefix: &str) -> Result<Vec<(String, Oid)>> {
            Ok(Vec::new())
        }
        fn push(&self, _remote: &str, _refspecs: &[String], _force_refs: &[String]) -> Result<()> {
            unimplemented!()
        }
        fn fetch(&self, _remote: &str, _refs: &[String]) -> Result<()> {
            unimplemented!()
        }
        fn delete_remote_branch(&self, _remote: &str, _name: &str) -> Result<()> {
            unimplemented!()
        }
        fn rewrite_messages(&self, _commits: &[(Oid, String)]) -> Result<Oid> {
            unimplemented!()
        }
        fn head_branch_name(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn config() -> Config {
        Config::new("alice", "origin", "main", "acme", "widgets")
    }

    #[test]
    fn selects_ordered_stack_oldest_first() {
        let git = FakeGit::linear(3);
        let stack = select_stack(&git, &config(), "head").unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.commits[0].message, "commit 1");
        assert_eq!(stack.commits[2].message, "commit 3");
    }

    #[test]
    fn empty_stack_is_rejected() {
        let git = FakeGit::linear(0);
        let err = select_stack(&git, &config(), "head").unwrap_err();
        assert!(matches!(err, GhstackError::EmptyStack));
    }

    #[test]
    fn too_long_stack_is_rejected_without_force() {
        let git = FakeGit::linear(10);
        let err = select_stack(&git, &config(), "head").unwrap_err();
        assert!(matches!(err, GhstackError::StackTooLong { len: 10, limit: 8 }));
    }

    #[test]
    fn too_long_stack_allowed_with_force() {
        let git = FakeGit::linear(10);
        let cfg = config().with_force(true);
        let stack = select_stack(&git, &cfg, "head").unwrap();
        assert_eq!(stack.len(), 10);
    }

    #[test]
    fn restrict_to_filters_by_oid_preserving_order() {
        let git = FakeGit::linear(3);
        let stack = select_stack(&git, &config(), "head").unwrap();
        let keep = vec![oid("c1"), oid("c3")];
        let restricted = restrict_to(&stack, &keep);
        assert_eq!(restricted.commits.len(), 2);
        assert_eq!(restricted.commits[0].oid, oid("c1"));
        assert_eq!(restricted.commits[1].oid, oid("c3"));
    }
}
