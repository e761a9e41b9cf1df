use crate::fixtures;
use git_subrepo_testtools::TestRepo;

#[test]
fn tree_of_an_empty_repository_prints_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let local = TestRepo::init(dir.path(), "local");

    local
        .subrepo()
        .args(["tree"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn tree_lists_top_level_imports() {
    let dir = tempfile::TempDir::new().unwrap();
    let (upstream, local) = fixtures::upstream_and_local(dir.path());
    local
        .subrepo()
        .args(["import", "lib", "lib", "master"])
        .assert()
        .success();

    local
        .subrepo()
        .args(["tree"])
        .assert()
        .success()
        .stdout(format!("lib/:lib at {}\n", upstream.head()));
}

#[test]
fn tree_shows_dependencies_as_children() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_l1, _l2, app, l1_sha, l2_sha) = fixtures::dependency_chain(dir.path());
    app.subrepo()
        .args(["import", "l2", ".", "master"])
        .assert()
        .success();

    app.subrepo().args(["tree"]).assert().success().stdout(format!(
        "./:l2 at {l2_sha}\n\
         └── ./:l1 at {l1_sha}\n"
    ));
}

#[test]
fn tree_branches_between_multiple_dependencies() {
    let dir = tempfile::TempDir::new().unwrap();
    let local = TestRepo::init(dir.path(), "local");
    local.write_file("own.txt", "x\n");
    local.commit_all("init");
    local.commit_empty(
        "import subrepo ./:app at 0123456789abcdef0123456789abcdef01234567\n\
         \n\
         import subrepo a/:alpha at aaaa456789abcdef0123456789abcdef01234567\n\
         import subrepo b/:beta at bbbb456789abcdef0123456789abcdef01234567",
    );

    local.subrepo().args(["tree"]).assert().success().stdout(
        "./:app at 0123456789abcdef0123456789abcdef01234567\n\
         ├── a/:alpha at aaaa456789abcdef0123456789abcdef01234567\n\
         └── b/:beta at bbbb456789abcdef0123456789abcdef01234567\n",
    );
}
