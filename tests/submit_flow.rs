//! End-to-end submit scenarios (spec.md §8 S1-S3): a fresh stack mints one
//! PR per commit; amending a commit updates only that PR and the ones
//! above it; an unrelated second submit with no changes is a no-op.

use predicates::prelude::*;

#[test]
fn fresh_stack_creates_one_pr_per_commit() {
    let ctx = testutil::test_context!().build();

    ctx.commit("Add widget frobnicator");
    ctx.commit("Wire frobnicator into pipeline");
    ctx.commit("Document the frobnicator");

    ctx.ghstack()
        .args(["submit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let state = ctx.read_mock_state();
    assert_eq!(state.prs.len(), 3);
    assert!(state.prs.iter().all(|pr| pr.state == "open"));
}

#[test]
fn resubmit_with_no_changes_is_a_no_op() {
    let ctx = testutil::test_context!().build();
    ctx.commit("Add widget frobnicator");
    ctx.ghstack().args(["submit"]).assert().success();
    let first = ctx.read_mock_state();

    ctx.ghstack().args(["submit"]).assert().success();
    let second = ctx.read_mock_state();

    assert_eq!(first.prs.len(), second.prs.len());
    assert_eq!(first.prs[0].title, second.prs[0].title);
}

#[test]
fn amending_top_commit_updates_only_its_pr() {
    let ctx = testutil::test_context!().build();
    ctx.commit("Add widget frobnicator");
    ctx.commit("Wire frobnicator into pipeline");
    ctx.ghstack().args(["submit"]).assert().success();

    ctx.amend("Wire frobnicator into pipeline, take two");
    ctx.ghstack().args(["submit"]).assert().success();

    let state = ctx.read_mock_state();
    assert_eq!(state.prs.len(), 2);
    assert!(state.prs.iter().any(|pr| pr.title.contains("take two")));
}

#[test]
fn empty_stack_is_rejected() {
    let ctx = testutil::test_context!().build();
    ctx.ghstack().args(["submit"]).assert().failure();
}
