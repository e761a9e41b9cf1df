//! The reimport operation: rewrite history so import commits follow amended
//! upstream commits.
//!
//! The whole history is replayed with `git rebase --interactive --exec`; the
//! exec step re-invokes this executable as `reimport-one` for every commit.
//! Each step inspects the message at HEAD: an import commit whose recorded
//! upstream commit was superseded by one with the same subject is re-imported
//! and amended in place, a delete commit gets its record set recomputed.
//! Everything else passes through untouched.

use crate::cleanup::CleanupStack;
use crate::commit_message;
use crate::commit_message::DeleteRecord;
use crate::commit_message::ImportRecord;
use crate::commit_message::Record;
use crate::error::Error;
use crate::execute;
use crate::execute::Cmd;
use crate::git::CommitSha;
use crate::git::Git;
use crate::subrepo::HostRepo;
use anyhow::Context as _;
use anyhow::Result;
use bstr::ByteSlice as _;

#[derive(Clone, Debug, Default)]
pub struct ReimportOptions {
    /// Only match commits on this remote branch instead of all remote refs.
    pub branch: Option<String>,
    /// Forward `--debug-commands` to the per-commit steps.
    pub debug_commands: bool,
}

/// Rewrite all import and delete commits reachable from HEAD.
pub fn reimport(host: &HostRepo, options: &ReimportOptions) -> Result<()> {
    let git = &host.git;
    if git.has_cached_changes()? {
        return Err(Error::DirtyIndex.into());
    }
    if !git.has_head()? {
        log::info!("No history, nothing to reimport");
        return Ok(());
    }

    let exe = std::env::current_exe().context("cannot locate the running executable")?;
    let mut step: Cmd = vec![exe.into_os_string(), "reimport-one".into()];
    if let Some(branch) = &options.branch {
        step.push(format!("--branch={branch}").into());
    }
    if options.debug_commands {
        step.push("--debug-commands".into());
    }
    let step = execute::format_command(&step);

    let command = git.command([
        "rebase",
        "--interactive",
        "--keep-empty",
        "--exec",
        step.as_str(),
        "--root",
    ]);

    // The working copy must never be left mid-rebase, whatever fails.
    let mut scope = CleanupStack::new();
    let abort = {
        let git = git.clone();
        scope.defer(move || {
            if let Err(err) = git.run(&git.command(["rebase", "--abort"])) {
                log::warn!("Failed to abort the rebase: {err}");
            }
        })
    };
    git.run_with_env(&command, &[("GIT_EDITOR", "true")])?;
    abort.release();
    Ok(())
}

/// One rebase step: rewrite the commit at HEAD if it carries records.
pub fn reimport_one(host: &HostRepo, options: &ReimportOptions) -> Result<()> {
    let git = &host.git;
    let head = git.rev_parse_commit("HEAD")?;
    let message = git.commit_message(&head)?;
    let records = commit_message::scan_records(&message);
    let Some(first) = records.first() else {
        return Ok(());
    };
    let first = first.clone();
    match &first.record {
        Record::Import(import) => {
            reimport_import(host, &message, first.line, import, options)
        }
        Record::Delete(delete) => reimport_delete(host, &message, delete),
    }
}

fn reimport_import(
    host: &HostRepo,
    message: &str,
    record_line: usize,
    import: &ImportRecord,
    options: &ReimportOptions,
) -> Result<()> {
    let git = &host.git;
    // The recorded commit can become unreachable, e.g. after a force-push on
    // the remote. Reimport is best effort and skips such commits.
    if !git.is_valid_commit(import.sha.as_str())? {
        log::warn!(
            "Recorded commit {} of {} is gone, leaving the import untouched",
            import.sha,
            import.id
        );
        return Ok(());
    }
    let subject = git.commit_subject(&import.sha)?;
    let candidates = find_by_subject(git, &import.id.repo, options.branch.as_deref(), &subject)?;
    let [new_sha] = candidates.as_slice() else {
        return Err(Error::ReimportAmbiguous {
            subject,
            candidates: candidates.iter().map(|sha| sha.to_string()).collect(),
        }
        .into());
    };
    if new_sha == &import.sha {
        return Ok(());
    }

    // Check the message shape before touching the working tree.
    commit_message::validate_record_block(message)?;
    let imports = crate::import::apply_import(host, &import.id, new_sha)?;
    let new_message = if record_line == 0 {
        commit_message::import_commit_message(&import.id, new_sha, &imports)
    } else {
        let block = commit_message::import_block_lines(&import.id, new_sha, &imports);
        commit_message::replace_record_block(message, &block)?
    };
    git.commit_amend(&new_message)?;
    Ok(())
}

/// A delete commit's tree effect has already been replayed by the rebase;
/// only the record set is recomputed against the rewritten parent.
fn reimport_delete(host: &HostRepo, message: &str, delete: &DeleteRecord) -> Result<()> {
    let git = &host.git;
    let parent = git.rev_parse_commit("HEAD^")?;
    let tree = host.dependency_tree(&parent)?;
    if tree.get(&delete.id).is_none() {
        log::warn!(
            "Subrepo {} is no longer visible below the delete commit, leaving it untouched",
            delete.id
        );
        return Ok(());
    }
    let plan = crate::delete::plan_delete(&tree, &delete.id)?;
    let new_message = commit_message::delete_commit_message(&delete.id, &plan.dependents);
    if new_message.trim_end() != message.trim_end() {
        git.commit_amend(&new_message)?;
    }
    Ok(())
}

/// All commits on the remote whose subject equals `subject` verbatim.
fn find_by_subject(
    git: &Git,
    repo: &str,
    branch: Option<&str>,
    subject: &str,
) -> Result<Vec<CommitSha>> {
    let range = match branch {
        Some(branch) => format!("refs/remotes/{repo}/{branch}"),
        None => format!("--remotes={repo}"),
    };
    let grep = format!("--grep={subject}");
    let command = git.command(["rev-list", "--fixed-strings", grep.as_str(), range.as_str()]);
    let out = git.run_capture(&command)?;
    let mut matches = Vec::new();
    for line in out.lines() {
        // --grep matches anywhere in the message; require the exact subject.
        let line = line.to_str().expect("rev-list prints hex commit ids");
        let candidate = CommitSha::new(line);
        if git.commit_subject(&candidate)? == subject {
            matches.push(candidate);
        }
    }
    Ok(matches)
}
