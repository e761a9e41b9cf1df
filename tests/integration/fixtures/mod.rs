use git_subrepo_testtools::TestRepo;
use std::path::Path;

/// An upstream repository with a single `test.hpp` and a local repository
/// knowing it as remote `lib`.
pub fn upstream_and_local(parent: &Path) -> (TestRepo, TestRepo) {
    let upstream = TestRepo::init(parent, "upstream");
    upstream.write_file("test.hpp", "int test() { return 42; }\n");
    upstream.commit_all("add test.hpp");

    let local = TestRepo::init(parent, "local");
    local.add_remote("lib", &upstream);
    local.fetch("lib");
    (upstream, local)
}

/// Three repositories forming a dependency chain: `l2` imports `l1` at its
/// root, `app` knows `l2` as a remote. Returns `(l1, l2, app)` together with
/// the commits `app` would record for them.
pub fn dependency_chain(parent: &Path) -> (TestRepo, TestRepo, TestRepo, String, String) {
    let l1 = TestRepo::init(parent, "l1");
    l1.write_file("a", "first library\n");
    let l1_sha = l1.commit_all("add a");

    let l2 = TestRepo::init(parent, "l2");
    l2.add_remote("l1", &l1);
    l2.fetch("l1");
    l2.subrepo()
        .args(["import", "l1", ".", "master"])
        .assert()
        .success();
    l2.write_file("b", "second library\n");
    let l2_sha = l2.commit_all("add b");

    let app = TestRepo::init(parent, "app");
    app.add_remote("l2", &l2);
    app.fetch("l2");
    (l1, l2, app, l1_sha, l2_sha)
}
