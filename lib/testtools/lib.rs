//! Test utilities for git-subrepo: throwaway repositories whose git commands
//! run under a pinned, deterministic environment.

use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;

/// Variables cleared on every spawned command so the surrounding user or CI
/// git setup cannot leak into a test repository.
const SCRUBBED_GIT_VARS: &[&str] = &[
    "GIT_DIR",
    "GIT_INDEX_FILE",
    "GIT_OBJECT_DIRECTORY",
    "GIT_ALTERNATE_OBJECT_DIRECTORIES",
    "GIT_WORK_TREE",
    "GIT_COMMON_DIR",
    "GIT_ASKPASS",
    "SSH_ASKPASS",
];

/// Fixed configuration, identities and dates. Replaying a commit over an
/// identical tree and message must reproduce the identical object id; the
/// reimport no-op tests depend on that.
const PINNED_GIT_VARS: &[(&str, &str)] = &[
    ("GIT_CONFIG_NOSYSTEM", "1"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_COUNT", "0"),
    ("GIT_TERMINAL_PROMPT", "false"),
    ("GIT_AUTHOR_NAME", "Subrepo Author"),
    ("GIT_AUTHOR_EMAIL", "author@subrepo.example"),
    ("GIT_AUTHOR_DATE", "2024-05-06T07:08:09+02:00"),
    ("GIT_COMMITTER_NAME", "Subrepo Committer"),
    ("GIT_COMMITTER_EMAIL", "committer@subrepo.example"),
    ("GIT_COMMITTER_DATE", "2024-05-06T10:11:12+02:00"),
];

/// The git-subrepo binary under test, run inside `dir`.
///
/// No git environment is touched here; invocations that operate on a
/// repository should go through [`TestRepo::subrepo`], which also pins the
/// environment.
pub fn cargo_bin_git_subrepo(dir: &Path) -> assert_cmd::Command {
    let mut command = assert_cmd::Command::cargo_bin("git-subrepo").unwrap();
    command.current_dir(dir);
    command
}

/// A throwaway git repository under a caller-provided parent directory. All
/// commands created through it carry the deterministic environment.
pub struct TestRepo {
    path: PathBuf,
}

impl TestRepo {
    pub fn init(parent: &Path, name: &str) -> Self {
        let path = parent.join(name);
        std::fs::create_dir_all(&path).expect("repository directory created");
        let repo = TestRepo { path };
        repo.git().args(["init", "-q", "-b", "master"]).assert().success();
        repo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply the scrubbed and pinned environment of this repository.
    fn deterministic(&self, mut command: assert_cmd::Command) -> assert_cmd::Command {
        for var in SCRUBBED_GIT_VARS {
            command.env_remove(var);
        }
        for (var, value) in PINNED_GIT_VARS {
            command.env(var, value);
        }
        command
    }

    /// A `git -C <repo>` command under the deterministic environment.
    pub fn git(&self) -> assert_cmd::Command {
        let mut command = assert_cmd::Command::new("git");
        command.args([OsStr::new("-C"), self.path.as_os_str()]);
        self.deterministic(command)
    }

    /// The git-subrepo binary under test, run from this repository.
    pub fn subrepo(&self) -> assert_cmd::Command {
        self.deterministic(cargo_bin_git_subrepo(&self.path))
    }

    /// The git-subrepo binary under test, run from a subdirectory.
    pub fn subrepo_in(&self, subdir: &str) -> assert_cmd::Command {
        self.deterministic(cargo_bin_git_subrepo(&self.path.join(subdir)))
    }

    pub fn write_file(&self, relative: &str, contents: &str) {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("parent directory created");
        }
        std::fs::write(path, contents).expect("file written");
    }

    pub fn remove_file(&self, relative: &str) {
        std::fs::remove_file(self.path.join(relative)).expect("file removed");
    }

    pub fn read_file(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path.join(relative)).expect("file read")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path.join(relative).exists()
    }

    pub fn add_all(&self) {
        self.git().args(["add", "--all", "."]).assert().success();
    }

    pub fn commit(&self, message: &str) -> String {
        self.git()
            .args(["commit", "-q", "--no-verify", "-m", message])
            .assert()
            .success();
        self.head()
    }

    pub fn commit_all(&self, message: &str) -> String {
        self.add_all();
        self.commit(message)
    }

    /// Record a commit without any tree change, e.g. to craft record-bearing
    /// messages directly.
    pub fn commit_empty(&self, message: &str) -> String {
        self.git()
            .args(["commit", "-q", "--no-verify", "--allow-empty", "-m", message])
            .assert()
            .success();
        self.head()
    }

    /// Stage everything and amend the current commit, keeping its message.
    pub fn amend_all(&self) -> String {
        self.add_all();
        self.git()
            .args(["commit", "-q", "--no-verify", "--amend", "--no-edit"])
            .assert()
            .success();
        self.head()
    }

    pub fn add_remote(&self, name: &str, other: &TestRepo) {
        self.git()
            .args([
                OsStr::new("remote"),
                OsStr::new("add"),
                OsStr::new(name),
                other.path.as_os_str(),
            ])
            .assert()
            .success();
    }

    pub fn fetch(&self, remote: &str) {
        self.git().args(["fetch", "-q", remote]).assert().success();
    }

    pub fn head(&self) -> String {
        self.rev_parse("HEAD")
    }

    pub fn rev_parse(&self, spec: &str) -> String {
        let output = self
            .git()
            .args(["rev-parse", spec])
            .output()
            .expect("rev-parse ran");
        assert!(output.status.success(), "rev-parse {spec} failed");
        String::from_utf8(output.stdout).unwrap().trim().to_owned()
    }

    /// The full commit message of a revision.
    pub fn message(&self, rev: &str) -> String {
        let output = self
            .git()
            .args(["show", "--no-patch", "--format=format:%B", rev])
            .output()
            .expect("git show ran");
        assert!(output.status.success(), "git show {rev} failed");
        String::from_utf8(output.stdout).unwrap()
    }

    /// The subject line of a revision.
    pub fn subject(&self, rev: &str) -> String {
        let output = self
            .git()
            .args(["show", "--no-patch", "--format=format:%s", rev])
            .output()
            .expect("git show ran");
        assert!(output.status.success(), "git show {rev} failed");
        String::from_utf8(output.stdout).unwrap().trim().to_owned()
    }
}
