use crate::fixtures;
use git_subrepo_testtools::TestRepo;
use predicates::prelude::*;

#[test]
fn import_at_a_prefix_copies_the_remote_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());
    local.write_file("own.txt", "not touched\n");
    local.commit_all("own file");

    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();

    assert_eq!(
        local.read_file("lib/test.hpp"),
        upstream.read_file("test.hpp")
    );
    assert_eq!(local.read_file("own.txt"), "not touched\n");
    assert_eq!(
        local.subject("HEAD"),
        format!("import subrepo lib/:lib at {}", upstream.head())
    );
}

#[test]
fn import_works_in_a_repository_without_history() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());

    local
        .subrepo()
        .args(["import", "lib", ".", "master"])
        .assert()
        .success();

    assert_eq!(
        local.read_file("test.hpp"),
        upstream.read_file("test.hpp")
    );
    assert_eq!(
        local.subject("HEAD"),
        format!("import subrepo ./:lib at {}", upstream.head())
    );
}

#[test]
fn import_from_a_subdirectory_resolves_the_prefix() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());
    local.write_file("sub/placeholder.txt", "x\n");
    local.commit_all("subdir");

    local
        .subrepo_in("sub")
        .args(["import", "lib", ".", "master"])
        .assert()
        .success();

    assert!(local.exists("sub/test.hpp"));
    assert!(local.subject("HEAD").starts_with("import subrepo sub/:lib at "));
}

#[test]
fn root_import_replaces_renamed_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());

    local
        .subrepo()
        .args(["import", "lib", ".", "master"])
        .assert()
        .success();
    assert!(local.exists("test.hpp"));

    // Rename upstream and amend, as if the import had tracked a moving
    // branch.
    upstream.remove_file("test.hpp");
    upstream.write_file("test2.hpp", "int test() { return 42; }\n");
    upstream.amend_all();
    local.fetch("lib");

    local
        .subrepo()
        .args(["import", "lib", ".", "master"])
        .assert()
        .success();

    assert!(!local.exists("test.hpp"));
    assert!(local.exists("test2.hpp"));
    assert_eq!(
        local.subject("HEAD"),
        format!("import subrepo ./:lib at {}", upstream.head())
    );
}

#[test]
fn import_refuses_a_dirty_index() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());
    local.write_file("staged.txt", "staged\n");
    local.add_all();

    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("uncommitted changes"));
}

#[test]
fn importing_the_current_state_again_reports_no_changes() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());

    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();
    let head = local.head();

    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no changes"));
    assert_eq!(local.head(), head);
}

#[test]
fn import_rejects_unknown_commits() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());

    local
        .subrepo()
        .args(["import", "lib", "lib", "no-such-branch"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("was not understood"));
}

#[test]
fn import_rejects_commits_outside_the_remote() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());
    local.write_file("own.txt", "local\n");
    let local_sha = local.commit_all("local commit");

    local
        .subrepo()
        .args(["import", "lib", "lib", local_sha.as_str()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a reachable commit"));

    // --force skips the ownership check.
    local
        .subrepo()
        .args(["import", "--force", "lib", "lib", local_sha.as_str()])
        .assert()
        .success();
    assert!(local.exists("lib/own.txt"));
}

#[test]
fn import_records_transitive_dependencies_sorted() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_l1, _l2, app, l1_sha, l2_sha) = fixtures::dependency_chain(dir.path());

    app.subrepo()
        .args(["import", "l2", ".", "master"])
        .assert()
        .success();

    assert!(app.exists("a"));
    assert!(app.exists("b"));
    assert_eq!(
        app.message("HEAD").trim_end(),
        format!(
            "import subrepo ./:l2 at {l2_sha}\n\
             \n\
             import subrepo ./:l1 at {l1_sha}"
        )
    );
}

#[test]
fn import_message_is_parseable_with_a_full_sha() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());

    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();

    let subject = local.subject("HEAD");
    let sha = subject.rsplit(' ').next().unwrap();
    assert_eq!(sha.len(), 40);
    assert!(sha.bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(sha, upstream.head());
}

#[test]
fn debug_commands_echoes_the_git_invocations() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_upstream, local) = fixtures::upstream_and_local(dir.path());

    local
        .subrepo()
        .args(["import", "--debug-commands", "lib", "lib", "master"])
        .assert()
        .success()
        .stderr(predicate::str::contains("rev-parse"));
}

#[test]
fn outside_a_repository_import_fails_cleanly() {
    let dir = tempfile::TempDir::new().unwrap();
    let not_a_repo = TestRepo::init(dir.path(), "plain");
    std::fs::remove_dir_all(not_a_repo.path().join(".git")).unwrap();

    not_a_repo
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .code(128);
}
