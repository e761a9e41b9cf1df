//! Git invocation helpers.
//!
//! Every command is prefixed with `git -C <root>` so the engine behaves the
//! same regardless of the process working directory. The builders below only
//! assemble argument vectors; execution goes through [`crate::execute`].

use crate::error::Error;
use crate::execute;
use crate::execute::Cmd;
use crate::execute::Feed;
use crate::execute::Sink;
use crate::execute::cmd;
use anyhow::Context as _;
use anyhow::Result;
use bstr::ByteSlice as _;
use lazy_static::lazy_static;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct CommitSha(String);

impl CommitSha {
    pub fn new(hex: impl Into<String>) -> Self {
        let hex = hex.into();
        debug_assert!(is_full_sha(&hex), "not a full commit sha: {hex}");
        CommitSha(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Check for a full 40-hex-digit commit identifier.
pub fn is_full_sha(s: &str) -> bool {
    s.len() == 40
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Weakest possible presence check; git handles everything beyond existence.
pub(crate) fn lexists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

lazy_static! {
    // Per git-ls-tree(1) each line reads `<mode> SP <type> SP <object> TAB <file>`.
    static ref LS_TREE_RE: regex::Regex =
        regex::Regex::new(r"^[^ \t]+ (?:tree|blob) [^ \t]+\t(.+)$").unwrap();
}

/// Handle to the repository all subrepo operations work on.
#[derive(Clone, Debug)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Git { root: root.into() }
    }

    /// Locate the repository containing the current working directory.
    pub fn from_cwd() -> Result<Self> {
        // No -C here; this is the call that produces the root for it.
        let command = cmd(["git", "rev-parse", "--show-toplevel"]);
        log::debug!("Running {}", execute::format_command(&command));
        let (out, _) = execute::execute(&command, &[], Feed::Null, Sink::Capture, Sink::Capture)?;
        let root = String::from_utf8_lossy(trim_newline(&out)).into_owned();
        Ok(Git::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build a `git -C <root> ...` command.
    pub fn command<I, S>(&self, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut command: Cmd = vec!["git".into(), "-C".into(), self.root.as_os_str().to_owned()];
        command.extend(args.into_iter().map(Into::into));
        command
    }

    /// Run a command, discarding stdout. Stderr is captured into the error on
    /// failure.
    pub fn run(&self, command: &Cmd) -> Result<(), Error> {
        self.run_with_env(command, &[])
    }

    pub fn run_with_env(&self, command: &Cmd, env: &[(&str, &str)]) -> Result<(), Error> {
        log::debug!("Running {}", execute::format_command(command));
        execute::execute(command, env, Feed::Null, Sink::Null, Sink::Capture)?;
        Ok(())
    }

    /// Run a command and return its raw stdout.
    pub fn run_capture(&self, command: &Cmd) -> Result<Vec<u8>, Error> {
        log::debug!("Running {}", execute::format_command(command));
        let (out, _) = execute::execute(command, &[], Feed::Null, Sink::Capture, Sink::Capture)?;
        Ok(out)
    }

    /// Run a command and return its exit status instead of failing on it.
    fn run_status(&self, command: &Cmd, stderr: Sink<'_>) -> Result<i32, Error> {
        log::debug!("Running {}", execute::format_command(command));
        match execute::execute(command, &[], Feed::Null, Sink::Null, stderr) {
            Ok(_) => Ok(0),
            Err(Error::Process { status, .. }) => Ok(status),
            Err(err) => Err(err),
        }
    }

    /// Run a command and return its output with the trailing newline removed.
    pub fn output_line(&self, command: &Cmd) -> Result<String, Error> {
        let out = self.run_capture(command)?;
        Ok(String::from_utf8_lossy(trim_newline(&out)).into_owned())
    }

    pub fn rev_parse(&self, spec: &str) -> Result<String, Error> {
        self.output_line(&self.command(["rev-parse", spec]))
    }

    /// The commit currently referenced by the given name.
    pub fn rev_parse_commit(&self, name: &str) -> Result<CommitSha, Error> {
        let sha = self.rev_parse(&format!("{name}^{{commit}}"))?;
        Ok(CommitSha::new(sha))
    }

    /// Resolve a possibly symbolic commit name against a remote repository.
    ///
    /// The name is first resolved below `refs/remotes/<repo>/`. A plain
    /// commit identifier will not resolve there, so as a fallback the name is
    /// resolved directly and accepted only if git echoes it back unchanged.
    pub fn resolve_commit(&self, repo: &str, commit: &str) -> Result<CommitSha> {
        let remote_ref = format!("refs/remotes/{repo}/{commit}^{{commit}}");
        match self.rev_parse(&remote_ref) {
            Ok(sha) => Ok(CommitSha::new(sha)),
            Err(Error::Process { .. }) => match self.rev_parse(&format!("{commit}^{{commit}}")) {
                Ok(sha) if sha == commit => Ok(CommitSha::new(sha)),
                Ok(_) | Err(Error::Process { .. }) => Err(Error::UnknownCommit {
                    name: commit.to_owned(),
                }
                .into()),
                Err(err) => Err(err.into()),
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Check whether a commit is reachable from the tips of a remote.
    ///
    /// Counting reachable remote commits with and without the candidate
    /// excluded avoids materializing a potentially huge commit list; any drop
    /// in the count proves membership.
    pub fn belongs_to_remote(&self, repo: &str, sha: &CommitSha) -> Result<bool> {
        let count = |exclude: Option<String>| -> Result<u64> {
            let mut command = vec![
                "rev-list".to_owned(),
                "--count".to_owned(),
                format!("--remotes={repo}"),
            ];
            command.extend(exclude);
            let out = self.output_line(&self.command(command))?;
            out.parse()
                .with_context(|| format!("unexpected rev-list --count output {out:?}"))
        };
        let including = count(None)?;
        let excluding = count(Some(format!("^{sha}")))?;
        Ok(including > excluding)
    }

    /// Check whether the index holds changes not yet committed.
    pub fn has_cached_changes(&self) -> Result<bool> {
        // git-diff-index and git-diff-tree would need a commit to compare
        // against, which does not exist before the first commit.
        let command = self.command(["diff", "--cached", "--no-patch", "--exit-code", "--quiet"]);
        match self.run_status(&command, Sink::Capture)? {
            0 => Ok(false),
            1 => Ok(true),
            status => Err(Error::Process {
                status,
                command: execute::format_command(&command),
                stderr: Vec::new(),
            }
            .into()),
        }
    }

    pub fn is_valid_commit(&self, name: &str) -> Result<bool> {
        let spec = format!("{name}^{{commit}}");
        let command = self.command(["rev-parse", "--quiet", "--verify", spec.as_str()]);
        Ok(self.run_status(&command, Sink::Null)? == 0)
    }

    pub fn has_head(&self) -> Result<bool> {
        self.is_valid_commit("HEAD")
    }

    /// The identifier of the empty tree object.
    ///
    /// The value is a well-known constant, but deriving it on the fly also
    /// documents where it comes from.
    pub fn empty_tree(&self) -> Result<String, Error> {
        self.output_line(&self.command(["hash-object", "-t", "tree", "/dev/null"]))
    }

    /// The raw commit message, subject and body.
    pub fn commit_message(&self, commit: &CommitSha) -> Result<String, Error> {
        let out = self.run_capture(&self.command([
            "show",
            "--no-patch",
            "--format=format:%B",
            commit.as_str(),
        ]))?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// The subject line of a commit.
    pub fn commit_subject(&self, commit: &CommitSha) -> Result<String, Error> {
        self.output_line(&self.command([
            "show",
            "--no-patch",
            "--format=format:%s",
            commit.as_str(),
        ]))
    }

    /// The top-level file and directory entries of a commit's tree.
    pub fn top_level_files(&self, sha: &CommitSha) -> Result<BTreeSet<String>, Error> {
        let tree_spec = format!("{sha}^{{tree}}");
        let out = self.run_capture(&self.command(["ls-tree", tree_spec.as_str()]))?;
        Ok(out
            .lines()
            .filter_map(|line| line.to_str().ok())
            .filter_map(|line| LS_TREE_RE.captures(line))
            .map(|captures| captures[1].to_owned())
            .collect())
    }

    pub fn commit(&self, message: &str, edit: bool) -> Result<(), Error> {
        let message_arg = format!("--message={message}");
        let mut command = self.command(["commit", "--no-verify", message_arg.as_str()]);
        if edit {
            command.push("--edit".into());
        }
        self.run(&command)
    }

    pub fn commit_amend(&self, message: &str) -> Result<(), Error> {
        let message_arg = format!("--message={message}");
        let command =
            self.command(["commit", "--amend", "--no-verify", message_arg.as_str()]);
        self.run(&command)
    }

    /// The common option fragment for diff-tree and diff-index.
    ///
    /// With a prefix, generated paths carry it on both sides; without one the
    /// patch uses bare paths, matching the `-p0` handed to `git apply`.
    pub fn diff_args(prefix: Option<&str>) -> Vec<OsString> {
        let mut args = cmd(["--full-index", "--binary", "--no-color"]);
        match prefix {
            Some(prefix) => {
                args.push(format!("--src-prefix={prefix}").into());
                args.push(format!("--dst-prefix={prefix}").into());
            }
            None => args.push("--no-prefix".into()),
        }
        args
    }

    /// A patch adding the full content of `to_tree` on top of `from_tree`.
    pub fn diff_tree_cmd(&self, diff_args: &[OsString], from_tree: &str, to_tree: &str) -> Cmd {
        let mut command = self.command(["diff-tree"]);
        command.extend(diff_args.iter().cloned());
        command.push(from_tree.into());
        command.push(to_tree.into());
        command
    }

    /// A patch removing an on-disk path, as the reverse diff against the
    /// empty tree. The on-disk path already acts as a prefix, hence
    /// `--no-prefix`.
    pub fn diff_away_cmd(&self, diff_args: &[OsString], empty_tree: &str, path: &str) -> Cmd {
        let mut command = self.command(["diff-index"]);
        command.extend(diff_args.iter().cloned());
        command.extend(cmd(["-R", "--no-prefix", empty_tree, path]));
        command
    }

    /// Feed the concatenated output of `patch_cmds` into `git apply --index`.
    ///
    /// git-apply errors on empty input, which occurs naturally when there is
    /// nothing to revert and nothing to add. A patch introducing a uniquely
    /// named throwaway file is always prepended and that very file excluded
    /// again, so the patch stream is never empty and the working tree is
    /// never touched by it.
    pub fn safe_apply_spring(&self, patch_cmds: Vec<Cmd>) -> Result<()> {
        let file = self.unused_dummy_name();
        let mut heads = vec![cmd(["echo".to_owned(), dummy_patch(&file)])];
        heads.extend(patch_cmds);
        let mut apply = self.command(["apply", "-p0", "--binary", "--index", "--apply"]);
        apply.push(format!("--exclude={file}").into());
        let tail = vec![apply];
        log::debug!("Running {}", execute::format_spring(&heads, &tail));
        execute::spring(&heads, &tail, &[], Sink::Null, Sink::Capture)?;
        Ok(())
    }

    /// A file name that does not exist in the repository root. The file is
    /// never created.
    fn unused_dummy_name(&self) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        loop {
            let name = format!(
                "null{}-{:x}",
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::Relaxed)
            );
            if !lexists(&self.root.join(&name)) {
                return name;
            }
        }
    }
}

/// A patch that has no effect, used to keep git-apply from seeing empty input.
fn dummy_patch(file: &str) -> String {
    format!(
        "diff --git {file} {file}\n\
         new file mode 100644\n\
         index 000000..000000\n"
    )
}

fn trim_newline(out: &[u8]) -> &[u8] {
    let out = out.strip_suffix(b"\n").unwrap_or(out);
    out.strip_suffix(b"\r").unwrap_or(out)
}
