//! The delete operation: remove a directly imported subrepo together with the
//! dependencies nothing else needs.

use crate::commit_message;
use crate::error::Error;
use crate::git;
use crate::git::CommitSha;
use crate::git::Git;
use crate::subrepo;
use crate::subrepo::DependencyTree;
use crate::subrepo::HostRepo;
use crate::subrepo::Prefix;
use crate::subrepo::SubrepoId;
use anyhow::Result;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct DeleteOptions {
    /// Let the user edit the commit message.
    pub edit: bool,
}

/// The partition of a delete's transitive closure.
pub(crate) struct DeletePlan {
    /// Identities to delete, including the top-level one.
    pub delete: BTreeMap<SubrepoId, CommitSha>,
    /// Identities in the closure that other imports still need.
    pub ignored: BTreeMap<SubrepoId, CommitSha>,
    /// The deleted identities besides the top-level one, for the message.
    pub dependents: BTreeSet<SubrepoId>,
}

/// Delete the subrepo imported at `prefix` from remote `repo`.
pub fn delete(host: &HostRepo, repo: &str, prefix: &Path, options: &DeleteOptions) -> Result<()> {
    let git = &host.git;
    if git.has_cached_changes()? {
        return Err(Error::DirtyIndex.into());
    }
    let cwd = std::env::current_dir()?;
    let prefix = Prefix::normalize(prefix, &cwd, git.root())?;
    let id = SubrepoId::new(repo, prefix);
    if !git.has_head()? {
        return Err(Error::UnknownSubrepo { id }.into());
    }
    let head = git.rev_parse_commit("HEAD")?;
    let tree = host.dependency_tree(&head)?;
    let plan = plan_delete(&tree, &id)?;

    let diff_args = Git::diff_args(None);
    let empty_tree = git.empty_tree()?;
    let mut files = file_set(git, &plan.delete)?;
    let ignored_files = file_set(git, &plan.ignored)?;
    files.retain(|file| !ignored_files.contains(file));
    let files = subrepo::remove_subsumed_files(&files);

    let mut patch_cmds = Vec::new();
    for file in &files {
        if git::lexists(&git.root().join(file)) {
            patch_cmds.push(git.diff_away_cmd(&diff_args, &empty_tree, file));
        }
    }
    git.safe_apply_spring(patch_cmds)?;
    if !git.has_cached_changes()? {
        return Err(Error::NoChanges.into());
    }
    let message = commit_message::delete_commit_message(&id, &plan.dependents);
    git.commit(&message, options.edit)?;
    Ok(())
}

/// Decide which identities a delete removes and which survive.
///
/// The closure starts at the direct import and follows its recorded
/// dependencies. A closure member survives when it was also imported on its
/// own or when a direct import outside the closure still pulls it in.
pub(crate) fn plan_delete(tree: &DependencyTree, id: &SubrepoId) -> Result<DeletePlan> {
    let Some(entry) = tree.get(id) else {
        return Err(Error::UnknownSubrepo { id: id.clone() }.into());
    };
    if let Some(by) = tree.dependents_of(id).first() {
        return Err(Error::StillDependedOn {
            id: id.clone(),
            by: (*by).clone(),
        }
        .into());
    }
    if !entry.direct {
        return Err(Error::NotDirectlyImported { id: id.clone() }.into());
    }

    let mut closure: BTreeSet<SubrepoId> = BTreeSet::new();
    closure.insert(id.clone());
    for dependency in &entry.dependencies {
        if tree.get(dependency).is_some() {
            closure.insert(dependency.clone());
        }
    }

    let mut delete = BTreeMap::new();
    let mut ignored = BTreeMap::new();
    for member in &closure {
        let member_entry = tree
            .get(member)
            .expect("closure members are visible imports");
        let externally_needed = member != id
            && (member_entry.direct
                || tree
                    .dependents_of(member)
                    .iter()
                    .any(|dependent| !closure.contains(dependent)));
        if externally_needed {
            ignored.insert(member.clone(), member_entry.sha.clone());
        } else {
            delete.insert(member.clone(), member_entry.sha.clone());
        }
    }
    let dependents = delete.keys().filter(|key| *key != id).cloned().collect();
    Ok(DeletePlan {
        delete,
        ignored,
        dependents,
    })
}

/// The prefixed top-level files of each entry whose recorded commit still
/// resolves.
fn file_set(git: &Git, entries: &BTreeMap<SubrepoId, CommitSha>) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    for (id, sha) in entries {
        if git.is_valid_commit(sha.as_str())? {
            for file in git.top_level_files(sha)? {
                files.insert(id.prefix.join_file(&file));
            }
        }
    }
    Ok(files)
}
