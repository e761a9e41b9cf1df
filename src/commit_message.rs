//! The import/delete record grammar carried in commit messages.
//!
//! Commit messages are the only metadata store. An import is recorded as
//! `import subrepo <prefix>:<repo> at <sha40>`, a deletion as
//! `delete subrepo <prefix>:<repo>`. A message created by this tool has the
//! top-level record as its subject and one record per transitive dependency
//! in the body, sorted lexicographically. Records may also appear embedded in
//! the body of an unrelated message (e.g. after a squash), in which case
//! every non-blank line from the first record onward must itself be a valid
//! record.

use crate::error::Error;
use crate::git::CommitSha;
use crate::subrepo::Prefix;
use crate::subrepo::SubrepoId;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Patterns for `git rev-list --extended-regexp --grep=...`. The line-by-line
/// parser below is the authority; these only preselect candidate commits.
pub const IMPORT_GREP_PATTERN: &str = "^import subrepo [^:]+:[^ ]+ at [0-9a-f]{40}$";
pub const DELETE_GREP_PATTERN: &str = "^delete subrepo [^:]+:[^ ]+$";

lazy_static! {
    static ref IMPORT_RE: regex::Regex =
        regex::Regex::new(r"^import subrepo ([^:\n]+):([^ \n]+) at ([0-9a-f]{40})$").unwrap();
    static ref DELETE_RE: regex::Regex =
        regex::Regex::new(r"^delete subrepo ([^:\n]+):([^ \n]+)$").unwrap();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRecord {
    pub id: SubrepoId,
    pub sha: CommitSha,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteRecord {
    pub id: SubrepoId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Import(ImportRecord),
    Delete(DeleteRecord),
}

/// A record together with the 0-based message line it was found on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocatedRecord {
    pub line: usize,
    pub record: Record,
}

pub fn import_line(id: &SubrepoId, sha: &CommitSha) -> String {
    format!("import subrepo {id} at {sha}")
}

pub fn delete_line(id: &SubrepoId) -> String {
    format!("delete subrepo {id}")
}

/// Parse a single line as a record. The full line must match.
pub fn parse_record(line: &str) -> Option<Record> {
    if let Some(captures) = IMPORT_RE.captures(line) {
        return Some(Record::Import(ImportRecord {
            id: SubrepoId::new(&captures[2], Prefix::from_recorded(&captures[1])),
            sha: CommitSha::new(&captures[3]),
        }));
    }
    if let Some(captures) = DELETE_RE.captures(line) {
        return Some(Record::Delete(DeleteRecord {
            id: SubrepoId::new(&captures[2], Prefix::from_recorded(&captures[1])),
        }));
    }
    None
}

/// All record lines of a message, in message order.
pub fn scan_records(message: &str) -> Vec<LocatedRecord> {
    message
        .lines()
        .enumerate()
        .filter_map(|(line, text)| parse_record(text).map(|record| LocatedRecord { line, record }))
        .collect()
}

/// The record lines of an import commit: the top-level import first, then one
/// line per transitive import.
///
/// The transitive imports can arrive in any order; their lines are sorted so
/// the final message is consistent across imports.
pub fn import_block_lines(
    id: &SubrepoId,
    sha: &CommitSha,
    imports: &BTreeMap<SubrepoId, CommitSha>,
) -> Vec<String> {
    let mut body: Vec<String> = imports
        .iter()
        .map(|(dep, dep_sha)| import_line(dep, dep_sha))
        .collect();
    body.sort();
    let mut lines = vec![import_line(id, sha)];
    lines.extend(body);
    lines
}

/// Craft the full commit message for an import.
pub fn import_commit_message(
    id: &SubrepoId,
    sha: &CommitSha,
    imports: &BTreeMap<SubrepoId, CommitSha>,
) -> String {
    join_block(&import_block_lines(id, sha, imports))
}

/// Craft the full commit message for a deletion; `dependents` are the
/// identities deleted along with the top-level one.
pub fn delete_commit_message(id: &SubrepoId, dependents: &BTreeSet<SubrepoId>) -> String {
    let mut body: Vec<String> = dependents.iter().map(delete_line).collect();
    body.sort();
    let mut lines = vec![delete_line(id)];
    lines.extend(body);
    join_block(&lines)
}

/// Subject, blank line, body.
fn join_block(lines: &[String]) -> String {
    if lines.len() == 1 {
        lines[0].clone()
    } else {
        format!("{}\n\n{}", lines[0], lines[1..].join("\n"))
    }
}

/// Verify that every non-blank line from the first record to the end of the
/// message is itself a valid record.
pub fn validate_record_block(message: &str) -> Result<(), Error> {
    let mut in_block = false;
    for line in message.lines() {
        if !in_block {
            in_block = parse_record(line).is_some();
        } else if !line.trim().is_empty() && parse_record(line).is_none() {
            return Err(Error::InvalidImportMessage {
                line: line.to_owned(),
            });
        }
    }
    Ok(())
}

/// Replace the trailing record block of a message, preserving the original
/// subject and body up to the first record.
///
/// Fails when the lines following the first record are not all records, and
/// when the message holds no record at all.
pub fn replace_record_block(message: &str, block_lines: &[String]) -> Result<String, Error> {
    validate_record_block(message)?;
    let mut block_start = None;
    let mut offset = 0;
    for line in message.split_inclusive('\n') {
        if parse_record(line.trim_end_matches(['\n', '\r'])).is_some() {
            block_start = Some(offset);
            break;
        }
        offset += line.len();
    }
    let Some(block_start) = block_start else {
        return Err(Error::InvalidImportMessage {
            line: message.lines().next().unwrap_or_default().to_owned(),
        });
    };
    Ok(format!(
        "{}{}\n",
        &message[..block_start],
        block_lines.join("\n")
    ))
}
