//! Land scenario (spec.md §8 S4, §4.6): landing the bottom PR of a
//! two-commit stack closes it and fast-forwards the upstream branch.

#[test]
fn land_closes_pr_and_advances_default_branch() {
    let ctx = testutil::test_context!().build();
    ctx.commit("Add widget frobnicator");
    ctx.ghstack().args(["submit"]).assert().success();

    let state = ctx.read_mock_state();
    let pr_number = state.prs[0].number;

    ctx.ghstack()
        .args(["land", &pr_number.to_string()])
        .assert()
        .success();

    let state = ctx.read_mock_state();
    assert_eq!(state.prs[0].state, "closed");

    let log = ctx
        .remote_git()
        .args(["log", "-1", "--format=%s", "refs/heads/main"])
        .output()
        .unwrap();
    let subject = String::from_utf8_lossy(&log.stdout);
    assert!(subject.contains("Add widget frobnicator"));
}

#[test]
fn landing_a_non_top_pr_is_rejected_without_force() {
    let ctx = testutil::test_context!().build();
    ctx.commit("Add widget frobnicator");
    ctx.commit("Wire frobnicator into pipeline");
    ctx.ghstack().args(["submit"]).assert().success();

    let state = ctx.read_mock_state();
    let bottom_pr = state.prs[0].number;

    ctx.ghstack()
        .args(["land", &bottom_pr.to_string()])
        .assert()
        .failure();
}
