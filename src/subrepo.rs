//! Subrepo identities and the dependency view recovered from history.
//!
//! A subrepo is identified by the pair of a remote name and the prefix it is
//! embedded at. All truth about which subrepos exist lives in commit
//! messages; [`HostRepo::dependency_tree`] recovers it by walking history
//! newest-first and keeping only the first record seen per identity.

use crate::commit_message;
use crate::commit_message::Record;
use crate::git::CommitSha;
use crate::git::Git;
use anyhow::Context as _;
use anyhow::Result;
use bstr::ByteSlice as _;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;

/// A path inside the importing repository, relative to its root and always
/// terminated by the separator. `./` denotes the root itself.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix(String);

impl Prefix {
    pub fn root() -> Self {
        Prefix("./".to_owned())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "./"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A prefix as found in a commit message, kept verbatim because it is
    /// part of the subrepo identity.
    pub fn from_recorded(recorded: &str) -> Self {
        Prefix(recorded.to_owned())
    }

    /// Normalize a user-supplied prefix.
    ///
    /// The prefix is interpreted relative to the invocation directory, not
    /// the repository root, so the tool behaves the same from any
    /// subdirectory. It is made absolute, re-relativized against the root and
    /// suffixed with the separator.
    pub fn normalize(user: &Path, cwd: &Path, root: &Path) -> Result<Self> {
        let absolute = normalize_lexically(&cwd.join(user));
        let root = normalize_lexically(root);
        let relative = pathdiff::diff_paths(&absolute, &root).with_context(|| {
            format!(
                "cannot express {} relative to {}",
                absolute.display(),
                root.display()
            )
        })?;
        if relative
            .components()
            .any(|component| component == Component::ParentDir)
        {
            anyhow::bail!(
                "prefix {} lies outside the repository at {}",
                user.display(),
                root.display()
            );
        }
        if relative.as_os_str().is_empty() {
            return Ok(Prefix::root());
        }
        let relative = relative
            .to_str()
            .with_context(|| format!("prefix {} is not valid UTF-8", relative.display()))?;
        Ok(Prefix(format!("{relative}/")))
    }

    /// Attach the prefix in front of a file path relative to the subrepo.
    pub fn join_file(&self, file: &str) -> String {
        if self.is_root() {
            file.to_owned()
        } else {
            format!("{}{}", self.0, file)
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other),
        }
    }
    result
}

/// The identity of a subrepo. The same remote imported at two prefixes forms
/// two distinct subrepos.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubrepoId {
    pub repo: String,
    pub prefix: Prefix,
}

impl SubrepoId {
    pub fn new(repo: impl Into<String>, prefix: Prefix) -> Self {
        SubrepoId {
            repo: repo.into(),
            prefix,
        }
    }
}

impl fmt::Display for SubrepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.repo)
    }
}

/// Remove every path that equals or lies below another path of the set.
///
/// Plain string prefix comparison would falsely collapse `foo/bar` into
/// `foo/barbaz`; the check is component aware. Paths are visited in sorted
/// order, each surviving path becoming the subsumer candidate for the
/// following ones.
pub fn remove_subsumed_files(files: &BTreeSet<String>) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    let mut subsumer: Option<&str> = None;
    for path in files {
        if let Some(parent) = subsumer
            && is_subsumed(path, parent)
        {
            continue;
        }
        result.insert(path.clone());
        subsumer = Some(path);
    }
    result
}

fn is_subsumed(path: &str, parent: &str) -> bool {
    if path == parent {
        return true;
    }
    let Some(rest) = path.strip_prefix(parent) else {
        return false;
    };
    parent.ends_with('/') || rest.starts_with('/')
}

/// An import visible from some commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedSubrepo {
    /// The remote commit recorded for the import.
    pub sha: CommitSha,
    /// True when the identity was imported on its own, i.e. its newest record
    /// leads a record block instead of following one.
    pub direct: bool,
    /// Identities pulled in transitively by this import.
    pub dependencies: Vec<SubrepoId>,
}

/// The forest of subrepo imports visible from a commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyTree {
    imports: BTreeMap<SubrepoId, ImportedSubrepo>,
}

impl DependencyTree {
    pub fn get(&self, id: &SubrepoId) -> Option<&ImportedSubrepo> {
        self.imports.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubrepoId, &ImportedSubrepo)> {
        self.imports.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }

    pub fn direct_imports(&self) -> impl Iterator<Item = (&SubrepoId, &ImportedSubrepo)> {
        self.imports.iter().filter(|(_, entry)| entry.direct)
    }

    /// The recorded commit per visible identity.
    pub fn sha_map(&self) -> BTreeMap<SubrepoId, CommitSha> {
        self.imports
            .iter()
            .map(|(id, entry)| (id.clone(), entry.sha.clone()))
            .collect()
    }

    /// Identities whose import pulled in `id` as a dependency.
    pub fn dependents_of(&self, id: &SubrepoId) -> Vec<&SubrepoId> {
        self.imports
            .iter()
            .filter(|(other, entry)| *other != id && entry.dependencies.contains(id))
            .map(|(other, _)| other)
            .collect()
    }
}

enum Seen {
    Imported(ImportedSubrepo),
    Deleted,
}

/// Apply the records of one message to the scan state. History is walked
/// newest-first, so the first decision per identity wins and a delete record
/// suppresses all earlier imports of the same identity.
fn apply_message_records(message: &str, state: &mut BTreeMap<SubrepoId, Seen>) {
    let records = commit_message::scan_records(message);
    let Some(first) = records.first() else {
        return;
    };
    // Imports following a leading import in the same message are its
    // transitive dependencies.
    let dependencies: Vec<SubrepoId> = if matches!(first.record, Record::Import(_)) {
        records[1..]
            .iter()
            .filter_map(|located| match &located.record {
                Record::Import(import) => Some(import.id.clone()),
                Record::Delete(_) => None,
            })
            .collect()
    } else {
        Vec::new()
    };
    for (index, located) in records.iter().enumerate() {
        match &located.record {
            Record::Import(import) => {
                state
                    .entry(import.id.clone())
                    .or_insert_with(|| {
                        Seen::Imported(ImportedSubrepo {
                            sha: import.sha.clone(),
                            direct: index == 0,
                            dependencies: if index == 0 {
                                dependencies.clone()
                            } else {
                                Vec::new()
                            },
                        })
                    });
            }
            Record::Delete(delete) => {
                state.entry(delete.id.clone()).or_insert(Seen::Deleted);
            }
        }
    }
}

/// The repository subrepos are imported into.
///
/// Dependency trees are cached per commit for the lifetime of one invocation;
/// all persistent state stays in git.
pub struct HostRepo {
    pub git: Git,
    tree_cache: RefCell<HashMap<CommitSha, Rc<DependencyTree>>>,
}

impl HostRepo {
    pub fn new(git: Git) -> Self {
        HostRepo {
            git,
            tree_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn from_cwd() -> Result<Self> {
        Ok(HostRepo::new(Git::from_cwd()?))
    }

    /// The imports visible from the given commit.
    pub fn dependency_tree(&self, commit: &CommitSha) -> Result<Rc<DependencyTree>> {
        if let Some(tree) = self.tree_cache.borrow().get(commit) {
            return Ok(tree.clone());
        }
        let tree = Rc::new(self.scan_dependency_tree(commit)?);
        self.tree_cache
            .borrow_mut()
            .insert(commit.clone(), tree.clone());
        Ok(tree)
    }

    fn scan_dependency_tree(&self, commit: &CommitSha) -> Result<DependencyTree> {
        let import_grep = format!("--grep={}", commit_message::IMPORT_GREP_PATTERN);
        let delete_grep = format!("--grep={}", commit_message::DELETE_GREP_PATTERN);
        let command = self.git.command([
            "rev-list",
            "--extended-regexp",
            import_grep.as_str(),
            delete_grep.as_str(),
            commit.as_str(),
        ]);
        let out = self.git.run_capture(&command)?;

        let mut state = BTreeMap::new();
        for line in out.lines() {
            let line = line.to_str().expect("rev-list prints hex commit ids");
            let record_commit = CommitSha::new(line);
            let message = self.git.commit_message(&record_commit)?;
            apply_message_records(&message, &mut state);
        }
        let imports = state
            .into_iter()
            .filter_map(|(id, seen)| match seen {
                Seen::Imported(entry) => Some((id, entry)),
                Seen::Deleted => None,
            })
            .collect();
        Ok(DependencyTree { imports })
    }
}
