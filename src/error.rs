use crate::subrepo::SubrepoId;

/// Application-level refusals and external failures, mapped to exit codes by
/// the command-line layer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A spawned program exited non-zero or was killed by a signal. Signal
    /// deaths carry the negated signal number.
    #[error("[status {}] {}{}", .status, .command, format_stderr(.stderr))]
    Process {
        status: i32,
        command: String,
        stderr: Vec<u8>,
    },

    /// poll(2) reported an error condition on one of the pipe descriptors.
    #[error("error while polling for new data, event: {events}")]
    Poll { events: String },

    #[error("failed to start {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("the index contains uncommitted changes, commit or stash them first")]
    DirtyIndex,

    #[error("no changes")]
    NoChanges,

    #[error("commit name '{name}' was not understood")]
    UnknownCommit { name: String },

    #[error("{commit} is not a reachable commit in remote repository {repo}")]
    NotInRemote { commit: String, repo: String },

    #[error("subrepo {id} is not imported")]
    UnknownSubrepo { id: SubrepoId },

    #[error("subrepo {id} was pulled in as a dependency and cannot be deleted directly")]
    NotDirectlyImported { id: SubrepoId },

    #[error("subrepo {id} is still depended on by {by}")]
    StillDependedOn { id: SubrepoId, by: SubrepoId },

    #[error(
        "found {} remote commits with subject {:?}{}",
        .candidates.len(),
        .subject,
        format_candidates(.candidates)
    )]
    ReimportAmbiguous {
        subject: String,
        candidates: Vec<String>,
    },

    #[error("malformed import message, line {line:?} is not a valid record")]
    InvalidImportMessage { line: String },

    #[error("inconsistent dependency tree: {reason}")]
    DependencyViolation { reason: String },
}

impl Error {
    /// The process exit code the command-line layer reports for this error.
    ///
    /// Failed child processes pass their own exit status through, everything
    /// else is an application-level refusal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Process { status, .. } => *status,
            _ => 1,
        }
    }
}

fn format_stderr(stderr: &[u8]) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": '{}'", String::from_utf8_lossy(stderr.trim_ascii_end()))
    }
}

fn format_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(": {}", candidates.join(", "))
    }
}
