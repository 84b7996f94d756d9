//! `ghstack status` (SPEC_FULL.md supplemented feature): read-only
//! classification, never writes to git or the forge.

#[test]
fn status_reports_new_commits_without_submitting() {
    let ctx = testutil::test_context!().build();
    ctx.commit("Add widget frobnicator");

    let output = ctx.ghstack().args(["status"]).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("new"));

    let state = ctx.read_mock_state();
    assert!(state.prs.is_empty(), "status must not create any PRs");
}

#[test]
fn status_reports_unchanged_after_submit() {
    let ctx = testutil::test_context!().build();
    ctx.commit("Add widget frobnicator");
    ctx.ghstack().args(["submit"]).assert().success();

    let output = ctx.ghstack().args(["status"]).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("unchanged"));
}
