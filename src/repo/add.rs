//! Staging: hash working-tree files into blobs and record them in the
//! index. Directories expand recursively through the ignore rules, and a
//! pathspec covering a vanished tracked file stages its deletion.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    errors::GitError,
    internal::{
        ignore::{self, IgnorePolicy},
        index::IndexEntry,
        object::blob::Blob,
    },
    repo::Repository,
};

/// What one `add` call did.
#[derive(Debug, Default, Clone)]
pub struct AddReport {
    /// Paths whose index entries were created or refreshed.
    pub staged: Vec<PathBuf>,
    /// Tracked paths staged as deletions because the file is gone.
    pub removed: Vec<PathBuf>,
    /// Pathspec members that matched nothing; the rest still processed.
    pub not_found: Vec<PathBuf>,
}

impl Repository {
    /// Stage the files matched by `pathspecs` (workdir-relative files or
    /// directories; an empty list means the whole working tree).
    ///
    /// Ignored files are skipped unless `force` is set or the path is
    /// already tracked.
    pub fn add(&self, pathspecs: &[PathBuf], force: bool) -> Result<AddReport, GitError> {
        let policy = if force {
            IgnorePolicy::IncludeIgnored
        } else {
            IgnorePolicy::Respect
        };

        let mut index = self.load_index()?;
        let mut report = AddReport::default();

        let specs: Vec<PathBuf> = if pathspecs.is_empty() {
            vec![PathBuf::new()]
        } else {
            pathspecs.to_vec()
        };

        for spec in &specs {
            let abs = self.work_dir().join(spec);
            if abs.is_dir() {
                // expand the directory through the ignore rules
                let all = ignore::list_workdir_files(self.work_dir(), self.git_dir(), policy)?;
                let in_scope: Vec<PathBuf> = all
                    .into_iter()
                    .filter(|p| spec.as_os_str().is_empty() || p.starts_with(spec))
                    .collect();
                for path in in_scope {
                    self.stage_file(&mut index, &path)?;
                    report.staged.push(path);
                }
                // tracked entries under the spec whose file vanished
                for tracked in index.tracked_files() {
                    let covered =
                        spec.as_os_str().is_empty() || tracked.starts_with(spec);
                    if covered && !self.work_dir().join(&tracked).exists() {
                        if let Some(name) = tracked.to_str() {
                            index.remove_all_stages(name);
                            report.removed.push(tracked);
                        }
                    }
                }
                continue;
            }

            if abs.exists() || abs.is_symlink() {
                let tracked = spec
                    .to_str()
                    .map(|s| index.tracked(s, 0))
                    .unwrap_or(false);
                if !tracked
                    && !force
                    && ignore::is_path_ignored(self.work_dir(), self.git_dir(), spec, false)
                {
                    debug!(path = %spec.display(), "skipping ignored path");
                    continue;
                }
                self.stage_file(&mut index, spec)?;
                report.staged.push(spec.clone());
            } else if spec.to_str().map(|s| index.tracked(s, 0)).unwrap_or(false) {
                // the file is gone but tracked: stage the deletion
                if let Some(name) = spec.to_str() {
                    index.remove_all_stages(name);
                    report.removed.push(spec.clone());
                }
            } else {
                report.not_found.push(spec.clone());
            }
        }

        self.save_index(&index)?;
        debug!(
            staged = report.staged.len(),
            removed = report.removed.len(),
            "add finished"
        );
        Ok(report)
    }

    /// Hash one file, ensure the blob is stored, upsert its index entry.
    fn stage_file(
        &self,
        index: &mut crate::internal::index::Index,
        path: &Path,
    ) -> Result<(), GitError> {
        let abs = self.work_dir().join(path);
        let content = self.read_workfile(&abs)?;
        let blob = Blob::from_content_bytes(content);
        self.storage.save(&blob)?;

        let entry = IndexEntry::new_from_file(path, blob.id, self.work_dir())?;
        // a fresh stage-0 entry supersedes any conflict stages
        if let Some(name) = path.to_str() {
            index.remove_all_stages(name);
        }
        index.update(entry);
        Ok(())
    }
}
