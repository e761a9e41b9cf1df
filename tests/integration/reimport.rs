use crate::fixtures;
use predicates::prelude::*;

#[test]
fn reimport_follows_an_amended_upstream_commit() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());
    local.write_file("own.txt", "kept\n");
    local.commit_all("own file");
    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();
    let old_sha = upstream.head();

    upstream.write_file("test.hpp", "int test() { return 43; }\n");
    let new_sha = upstream.amend_all();
    assert_ne!(old_sha, new_sha);
    local.fetch("lib");

    local.subrepo().args(["reimport"]).assert().success();

    assert_eq!(
        local.subject("HEAD"),
        format!("import subrepo lib/:lib at {new_sha}")
    );
    assert_eq!(
        local.read_file("lib/test.hpp"),
        "int test() { return 43; }\n"
    );
    assert_eq!(local.read_file("own.txt"), "kept\n");
}

#[test]
fn reimport_is_a_no_op_when_the_recorded_commit_still_matches() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());
    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();
    let head = local.head();

    local.subrepo().args(["reimport"]).assert().success();

    // The committer identity and dates are pinned, so untouched commits are
    // replayed byte-identical.
    assert_eq!(local.head(), head);
}

#[test]
fn reimport_restricted_to_a_branch() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());
    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();

    upstream.write_file("test.hpp", "int test() { return 44; }\n");
    let new_sha = upstream.amend_all();
    local.fetch("lib");

    local
        .subrepo()
        .args(["reimport", "--branch=master"])
        .assert()
        .success();

    assert_eq!(
        local.subject("HEAD"),
        format!("import subrepo lib/:lib at {new_sha}")
    );
}

#[test]
fn ambiguous_subjects_abort_the_rebase() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());
    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();
    let head = local.head();

    // Two remote commits with the same subject as the imported one.
    upstream.write_file("more.txt", "more\n");
    upstream.commit_all("add test.hpp");
    upstream.write_file("test.hpp", "int test() { return 45; }\n");
    upstream.amend_all();
    local.fetch("lib");

    local
        .subrepo()
        .args(["reimport"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("remote commits with subject"));

    // The rebase was aborted, not left in progress.
    assert_eq!(local.head(), head);
    assert!(!local.path().join(".git/rebase-merge").exists());
    assert!(!local.path().join(".git/rebase-apply").exists());
}

#[test]
fn reimport_refuses_a_dirty_index() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());
    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();
    local.write_file("staged.txt", "staged\n");
    local.add_all();

    local
        .subrepo()
        .args(["reimport"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("uncommitted changes"));
}
