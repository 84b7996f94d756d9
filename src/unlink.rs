//! Unlink engine (spec.md §4.7): strips ghstack trailers from local
//! commits without touching the forge or any remote branch.

use crate::commit_msg::{self, GhstackTrailers};
use crate::error::Result;
use crate::git::{Git, Oid};

/// Rewrites each of `commits` (oldest first) to drop its ghstack
/// trailers, preserving prose and any unrelated trailers. Returns the new
/// tip of the rewritten branch.
pub fn unlink(git: &dyn Git, commits: &[(Oid, String)]) -> Result<Oid> {
    let rewrites: Vec<(Oid, String)> = commits
        .iter()
        .map(|(oid, message)| {
            let parsed = commit_msg::parse(message);
            let stripped = commit_msg::emit(&parsed.prose, &parsed.user_trailers, &GhstackTrailers::default());
            (oid.clone(), stripped)
        })
        .collect();
    git.rewrite_messages(&rewrites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{CommitInfo, Signature};
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeGit {
        rewritten: RefCell<Vec<(Oid, String)>>,
    }

    impl Git for FakeGit {
        fn resolve(&self, _rev: &str) -> Result<Oid> {
            unimplemented!()
        }
        fn try_resolve(&self, _rev: &str) -> Result<Option<Oid>> {
            unimplemented!()
        }
        fn commits_between(&self, _base: &Oid, _head: &Oid) -> Result<Vec<CommitInfo>> {
            unimplemented!()
        }
        fn merge_base(&self, _a: &Oid, _b: &Oid) -> Result<Option<Oid>> {
            unimplemented!()
        }
        fn commit_info(&self, _oid: &Oid) -> Result<CommitInfo> {
            unimplemented!()
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
            unimplemented!()
        }
        fn for_each_local_branch(&self, _prefix: &str) -> Result<Vec<(String, Oid)>> {
            unimplemented!()
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
        fn rewrite_messages(&self, commits: &[(Oid, String)]) -> Result<Oid> {
            *self.rewritten.borrow_mut() = commits.to_vec();
            Ok(commits.last().unwrap().0.clone())
        }
        fn head_branch_name(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn strips_ghstack_trailers_keeps_others() {
        let git = FakeGit::default();
        let msg = "Fix widget\n\nSigned-off-by: Alice\n\nghstack-source-id: abc\nPull Request resolved: https://github.com/o/r/pull/5";
        unlink(&git, &[(Oid("c1".to_string()), msg.to_string())]).unwrap();
        let rewritten = git.rewritten.borrow();
        assert_eq!(rewritten.len(), 1);
        assert!(rewritten[0].1.contains("Signed-off-by: Alice"));
        assert!(!rewritten[0].1.contains("ghstack-source-id"));
        assert!(!rewritten[0].1.contains("Pull Request resolved"));
    }
}
