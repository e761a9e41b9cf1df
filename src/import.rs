//! The import operation: materialize a subrepo state at a prefix.

use crate::commit_message;
use crate::error::Error;
use crate::git;
use crate::git::CommitSha;
use crate::git::Git;
use crate::subrepo;
use crate::subrepo::HostRepo;
use crate::subrepo::Prefix;
use crate::subrepo::SubrepoId;
use anyhow::Result;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    /// Import even when the commit is not reachable from the remote's tips.
    pub force: bool,
    /// Let the user edit the commit message.
    pub edit: bool,
}

/// Import `commit` of remote `repo` at `prefix` and commit the result.
pub fn import(
    host: &HostRepo,
    repo: &str,
    prefix: &Path,
    commit: &str,
    options: &ImportOptions,
) -> Result<()> {
    let git = &host.git;
    // Proceeding would discard whatever the user has staged.
    if git.has_cached_changes()? {
        return Err(Error::DirtyIndex.into());
    }
    let cwd = std::env::current_dir()?;
    let prefix = Prefix::normalize(prefix, &cwd, git.root())?;
    let id = SubrepoId::new(repo, prefix);

    // Resolve the symbolic name up front; the commit message must carry the
    // full identifier, so the rest of the operation works with it as well.
    let sha = git.resolve_commit(repo, commit)?;
    if !options.force && !git.belongs_to_remote(repo, &sha)? {
        return Err(Error::NotInRemote {
            commit: commit.to_owned(),
            repo: repo.to_owned(),
        }
        .into());
    }

    let imports = apply_import(host, &id, &sha)?;
    if !git.has_cached_changes()? {
        // Same behavior as git-commit when there is nothing to commit.
        return Err(Error::NoChanges.into());
    }
    let message = commit_message::import_commit_message(&id, &sha, &imports);
    git.commit(&message, options.edit)?;
    Ok(())
}

/// Stage the working-tree transition to the state of `sha`, leaving files not
/// owned by the subrepo untouched.
///
/// A single patch stream is assembled and fed through one `git apply
/// --index`: first revert patches for everything the new state, the
/// previously imported state of this identity, and the currently imported
/// states of the new state's dependencies own, then the forward patch adding
/// the target tree. Reverting the old state as well is what makes renames and
/// deletions between imports come out right.
///
/// Returns the transitive imports visible from the target commit, keyed by
/// identity, for use in the commit message.
pub(crate) fn apply_import(
    host: &HostRepo,
    id: &SubrepoId,
    sha: &CommitSha,
) -> Result<BTreeMap<SubrepoId, CommitSha>> {
    let git = &host.git;
    let diff_args = Git::diff_args(match id.prefix.is_root() {
        true => None,
        false => Some(id.prefix.as_str()),
    });
    let empty_tree = git.empty_tree()?;

    let mut files: BTreeSet<String> = git
        .top_level_files(sha)?
        .iter()
        .map(|file| id.prefix.join_file(file))
        .collect();

    let remote_imports = host.dependency_tree(sha)?.sha_map();
    if git.has_head()? {
        let head = git.rev_parse_commit("HEAD")?;
        let current = host.dependency_tree(&head)?;

        // The import may happen indirectly as part of another import whose
        // commit data is not available here; only identities whose recorded
        // commit still resolves contribute their file sets.
        let mut keys: BTreeSet<&SubrepoId> = remote_imports.keys().collect();
        keys.insert(id);
        for key in keys {
            if let Some(entry) = current.get(key)
                && git.is_valid_commit(entry.sha.as_str())?
            {
                for file in git.top_level_files(&entry.sha)? {
                    files.insert(key.prefix.join_file(&file));
                }
            }
        }
    }
    let files = subrepo::remove_subsumed_files(&files);

    let mut patch_cmds = Vec::new();
    for file in &files {
        if git::lexists(&git.root().join(file)) {
            patch_cmds.push(git.diff_away_cmd(&diff_args, &empty_tree, file));
        }
    }
    patch_cmds.push(git.diff_tree_cmd(&diff_args, &empty_tree, &format!("{sha}^{{tree}}")));
    git.safe_apply_spring(patch_cmds)?;
    Ok(remote_imports)
}
