//! Status reporting: the tri-partite classification of every path into
//! staged (HEAD tree vs index), unstaged (index vs working tree) and
//! untracked, with rename detection over the staged pairs.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};

use crate::{
    diff::Diff,
    errors::GitError,
    hash::ObjectHash,
    internal::{
        ignore::{self, IgnorePolicy},
        object::{blob::Blob, tree::TreeItemMode},
    },
    repo::Repository,
};

/// Minimum content similarity for a delete/add pair to count as a rename.
const RENAME_THRESHOLD: f32 = 0.5;

/// Index vs HEAD classification of one path.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedChange {
    Added,
    Modified,
    Deleted,
    TypeChanged,
    Renamed { from: PathBuf, similarity: f32 },
}

/// Working tree vs index classification of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeChange {
    Modified,
    Deleted,
    TypeChanged,
}

/// Full status of the repository at one instant.
#[derive(Debug, Default, Clone)]
pub struct StatusReport {
    pub staged: Vec<(PathBuf, StagedChange)>,
    pub unstaged: Vec<(PathBuf, WorktreeChange)>,
    pub untracked: Vec<PathBuf>,
    /// Paths carrying conflict stages from an interrupted merge.
    pub conflicted: Vec<PathBuf>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.unstaged.is_empty()
            && self.untracked.is_empty()
            && self.conflicted.is_empty()
    }

    /// Whether any tracked file differs from HEAD or the index (untracked
    /// files do not block checkout).
    pub fn has_uncommitted_changes(&self) -> bool {
        !self.staged.is_empty() || !self.unstaged.is_empty() || !self.conflicted.is_empty()
    }
}

impl Repository {
    /// Compute the full tri-partite status.
    pub fn status(&self) -> Result<StatusReport, GitError> {
        let index = self.load_index()?;
        let mut report = StatusReport {
            conflicted: index
                .conflicted_paths()
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            ..Default::default()
        };

        // ---- staged: HEAD tree vs index -------------------------------
        let head_items: HashMap<PathBuf, (ObjectHash, TreeItemMode)> =
            match self.refs.head_commit()? {
                Some(head) => self
                    .commit_plain_items(&head)?
                    .into_iter()
                    .map(|(path, hash, mode)| (path, (hash, mode)))
                    .collect(),
                None => HashMap::new(),
            };

        let mut added: Vec<(PathBuf, ObjectHash)> = Vec::new();
        let mut deleted: Vec<(PathBuf, ObjectHash)> = Vec::new();

        for (path, (head_hash, head_mode)) in head_items.iter() {
            let name = path.to_string_lossy();
            match index.get(&name, 0) {
                Some(entry) => {
                    let index_kind = TreeItemMode::from_unix_mode(entry.mode).ok();
                    if type_changed(*head_mode, index_kind) {
                        report
                            .staged
                            .push((path.clone(), StagedChange::TypeChanged));
                    } else if entry.hash != *head_hash {
                        report.staged.push((path.clone(), StagedChange::Modified));
                    }
                }
                None => deleted.push((path.clone(), *head_hash)),
            }
        }
        for entry in index.tracked_entries(0) {
            let path = PathBuf::from(&entry.name);
            if !head_items.contains_key(&path) {
                added.push((path, entry.hash));
            }
        }

        self.detect_renames(&mut report, added, deleted)?;

        // ---- unstaged: index vs working tree --------------------------
        for entry in index.tracked_entries(0) {
            let path = PathBuf::from(&entry.name);
            let abs = self.work_dir().join(&path);
            let meta = std::fs::symlink_metadata(&abs).ok();
            let Some(meta) = meta else {
                report.unstaged.push((path, WorktreeChange::Deleted));
                continue;
            };

            let entry_is_link = entry.mode == 0o120000;
            if meta.file_type().is_symlink() != entry_is_link {
                report.unstaged.push((path, WorktreeChange::TypeChanged));
                continue;
            }

            // stat cache first; only a hash mismatch marks the file modified
            if index.is_modified(&entry.name, 0, self.work_dir()) {
                let hash = self.calc_file_blob_hash(&abs)?;
                if hash != entry.hash {
                    report.unstaged.push((path, WorktreeChange::Modified));
                }
            }
        }

        // ---- untracked ------------------------------------------------
        let tracked: HashSet<PathBuf> = index.tracked_files().into_iter().collect();
        let files =
            ignore::list_workdir_files(self.work_dir(), self.git_dir(), IgnorePolicy::Respect)?;
        for file in files {
            if !tracked.contains(&file) {
                report.untracked.push(file);
            }
        }

        report.staged.sort_by(|a, b| a.0.cmp(&b.0));
        report.unstaged.sort_by(|a, b| a.0.cmp(&b.0));
        report.untracked.sort();
        Ok(report)
    }

    /// Pair staged deletions with staged additions of similar content
    /// (identical blob, or line similarity at or above the threshold).
    fn detect_renames(
        &self,
        report: &mut StatusReport,
        added: Vec<(PathBuf, ObjectHash)>,
        deleted: Vec<(PathBuf, ObjectHash)>,
    ) -> Result<(), GitError> {
        let mut free_deleted: Vec<(PathBuf, ObjectHash, bool)> = deleted
            .into_iter()
            .map(|(path, hash)| (path, hash, false))
            .collect();

        for (new_path, new_hash) in added {
            let mut best: Option<(usize, f32)> = None;
            for (i, (_, old_hash, used)) in free_deleted.iter().enumerate() {
                if *used {
                    continue;
                }
                let score = if *old_hash == new_hash {
                    1.0
                } else {
                    let old_blob: Blob = self.storage.load(old_hash)?;
                    let new_blob: Blob = self.storage.load(&new_hash)?;
                    Diff::similarity(&old_blob.data, &new_blob.data)
                };
                if score >= RENAME_THRESHOLD
                    && best.map(|(_, prev)| score > prev).unwrap_or(true)
                {
                    best = Some((i, score));
                }
            }

            match best {
                Some((i, similarity)) => {
                    free_deleted[i].2 = true;
                    report.staged.push((
                        new_path,
                        StagedChange::Renamed {
                            from: free_deleted[i].0.clone(),
                            similarity,
                        },
                    ));
                }
                None => report.staged.push((new_path, StagedChange::Added)),
            }
        }

        for (path, _, used) in free_deleted {
            if !used {
                report.staged.push((path, StagedChange::Deleted));
            }
        }
        Ok(())
    }
}

fn type_changed(head_mode: TreeItemMode, index_kind: Option<TreeItemMode>) -> bool {
    let Some(index_kind) = index_kind else {
        return false;
    };
    let is_link = |m: TreeItemMode| m == TreeItemMode::Link;
    is_link(head_mode) != is_link(index_kind)
}
