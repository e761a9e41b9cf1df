//! The tree report: the imports visible from HEAD, one line per subrepo.

use crate::subrepo::DependencyTree;
use crate::subrepo::HostRepo;
use crate::subrepo::SubrepoId;
use anyhow::Result;
use std::collections::BTreeSet;

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const VERTICAL: &str = "│   ";
const INDENT: &str = "    ";

/// Render the dependency forest of HEAD.
pub fn render(host: &HostRepo) -> Result<String> {
    let git = &host.git;
    if !git.has_head()? {
        return Ok(String::new());
    }
    let head = git.rev_parse_commit("HEAD")?;
    let tree = host.dependency_tree(&head)?;
    let mut out = String::new();
    for (id, entry) in tree.direct_imports() {
        out.push_str(&format!("{id} at {}\n", entry.sha));
        let mut visited = BTreeSet::new();
        visited.insert(id.clone());
        render_children(&tree, &entry.dependencies, "", &mut visited, &mut out);
    }
    Ok(out)
}

fn render_children(
    tree: &DependencyTree,
    dependencies: &[SubrepoId],
    indent: &str,
    visited: &mut BTreeSet<SubrepoId>,
    out: &mut String,
) {
    let children: Vec<&SubrepoId> = dependencies
        .iter()
        .filter(|child| tree.get(child).is_some() && !visited.contains(child))
        .collect();
    for (index, child) in children.iter().enumerate() {
        let last = index == children.len() - 1;
        let entry = tree.get(child).expect("children are visible imports");
        let connector = if last { LAST_BRANCH } else { BRANCH };
        out.push_str(&format!("{indent}{connector}{child} at {}\n", entry.sha));
        visited.insert((*child).clone());
        let child_indent = format!("{indent}{}", if last { INDENT } else { VERTICAL });
        render_children(tree, &entry.dependencies, &child_indent, visited, out);
    }
}
