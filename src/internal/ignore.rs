//! Gitignore filtering for working-tree walks: per-directory `.gitignore`
//! files plus `<git-dir>/info/exclude`, with the usual semantics
//! (negation, directory-only patterns, `**` globs, anchored leading `/`,
//! character classes), provided by the `ignore` crate.

use std::path::{Path, PathBuf};

use ignore::{WalkBuilder, gitignore::Gitignore};

use crate::{errors::GitError, internal::index::Index};

/// Describes how operations should treat entries matched by ignore rules.
/// - `Respect`: honor ignore rules for untracked files but always keep tracked ones.
/// - `IncludeIgnored`: disable ignore filtering entirely (force-add flows).
/// - `OnlyIgnored`: surface only the ignored set (status --ignored flows).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IgnorePolicy {
    Respect,
    IncludeIgnored,
    OnlyIgnored,
}

/// List working-tree files (workdir-relative) under `policy`.
///
/// The git directory itself is never reported. `Respect` applies the full
/// rule stack, `IncludeIgnored` reports everything, and `OnlyIgnored`
/// reports exactly the files the rule stack would have hidden.
pub fn list_workdir_files(
    workdir: &Path,
    git_dir: &Path,
    policy: IgnorePolicy,
) -> Result<Vec<PathBuf>, GitError> {
    match policy {
        IgnorePolicy::Respect => walk(workdir, git_dir, true),
        IgnorePolicy::IncludeIgnored => walk(workdir, git_dir, false),
        IgnorePolicy::OnlyIgnored => {
            let all = walk(workdir, git_dir, false)?;
            let kept: std::collections::HashSet<PathBuf> =
                walk(workdir, git_dir, true)?.into_iter().collect();
            Ok(all.into_iter().filter(|p| !kept.contains(p)).collect())
        }
    }
}

fn walk(workdir: &Path, git_dir: &Path, respect_rules: bool) -> Result<Vec<PathBuf>, GitError> {
    let git_dir = git_dir.to_path_buf();
    let mut builder = WalkBuilder::new(workdir);
    builder
        .hidden(false)
        .parents(false)
        .ignore(false)
        .git_global(false)
        .git_ignore(respect_rules)
        .git_exclude(respect_rules)
        .require_git(false)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            entry.file_name() != std::ffi::OsStr::new(".git")
                && entry.path() != git_dir.as_path()
        });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry.map_err(|e| GitError::CustomError(e.to_string()))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(workdir) {
            files.push(rel.to_path_buf());
        }
    }
    Ok(files)
}

/// Whether one workdir-relative path is hidden by the ignore rule stack.
///
/// Precedence follows Git: the deepest `.gitignore` wins, then parents,
/// then `info/exclude`.
pub fn is_path_ignored(workdir: &Path, git_dir: &Path, path: &Path, is_dir: bool) -> bool {
    // Per-directory matchers, deepest first.
    let mut dirs = vec![workdir.to_path_buf()];
    if let Some(parent) = path.parent() {
        let mut acc = workdir.to_path_buf();
        for component in parent.components() {
            acc = acc.join(component);
            dirs.push(acc.clone());
        }
    }

    let abs = workdir.join(path);
    for dir in dirs.iter().rev() {
        let file = dir.join(".gitignore");
        if !file.is_file() {
            continue;
        }
        let (matcher, _) = Gitignore::new(&file);
        let matched = matcher.matched_path_or_any_parents(&abs, is_dir);
        if matched.is_ignore() {
            return true;
        }
        if matched.is_whitelist() {
            return false;
        }
    }

    let exclude = git_dir.join("info").join("exclude");
    if exclude.is_file() {
        let mut builder = ignore::gitignore::GitignoreBuilder::new(workdir);
        builder.add(&exclude);
        if let Ok(matcher) = builder.build() {
            let matched = matcher.matched_path_or_any_parents(&abs, is_dir);
            if matched.is_ignore() {
                return true;
            }
        }
    }
    false
}

/// Returns `true` if the given workdir-relative `path` should be filtered
/// out under `policy`. The check is index-aware; tracked entries remain
/// visible for `Respect`, are always included for `IncludeIgnored`, and
/// get filtered when `OnlyIgnored` is requested.
pub fn should_ignore(
    path: &Path,
    policy: IgnorePolicy,
    index: &Index,
    workdir: &Path,
    git_dir: &Path,
) -> bool {
    let path_str = match path.to_str() {
        Some(s) => s,
        None => return true,
    };
    let is_tracked = index.tracked(path_str, 0);

    match policy {
        IgnorePolicy::Respect => {
            if is_tracked {
                return false;
            }
            is_path_ignored(workdir, git_dir, path, false)
        }
        IgnorePolicy::IncludeIgnored => false,
        IgnorePolicy::OnlyIgnored => {
            if is_tracked {
                return true;
            }
            !is_path_ignored(workdir, git_dir, path, false)
        }
    }
}

/// Applies [`should_ignore`] over an iterator of workdir paths and returns
/// the retained list.
pub fn filter_workdir_paths<I>(
    paths: I,
    policy: IgnorePolicy,
    index: &Index,
    workdir: &Path,
    git_dir: &Path,
) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    paths
        .into_iter()
        .filter(|path| !should_ignore(path, policy, index, workdir, git_dir))
        .collect()
}
