//! Merging: already-up-to-date and fast-forward detection over the
//! ancestry queries, and the three-way tree merge with diff3 content
//! merging, conflict staging and `MERGE_HEAD` bookkeeping.

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::PathBuf,
};

use tracing::debug;

use crate::{
    diff::{Diff, merge_three_way},
    errors::GitError,
    hash::ObjectHash,
    internal::{
        index::{Index, IndexEntry},
        object::{blob::Blob, tree::TreeItemMode},
        refs::{Head, RefExpectation},
    },
    repo::Repository,
    utils,
};

/// How a merge concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The source is already contained in HEAD; nothing changed.
    AlreadyUpToDate,
    /// HEAD was behind the source and advanced without a merge commit.
    FastForward(ObjectHash),
    /// A merge commit with two parents was created.
    Merged(ObjectHash),
}

/// One path's `(hash, mode)` in a tree snapshot.
type TreeEntry = (ObjectHash, TreeItemMode);

#[derive(Debug)]
struct Conflict {
    path: PathBuf,
    base: Option<TreeEntry>,
    ours: Option<TreeEntry>,
    theirs: Option<TreeEntry>,
    /// Worktree content for the conflicted file (markers, or the
    /// surviving side of a modify/delete).
    content: Vec<u8>,
}

impl Repository {
    /// Merge `source_ref` into HEAD.
    ///
    /// Returns the outcome on success. With unresolved conflicts the
    /// working tree holds the marked-up files, the index carries stages
    /// 1/2/3, `MERGE_HEAD`/`MERGE_MSG` are persisted, and the call fails
    /// with `MergeConflict`.
    pub fn merge(&self, source_ref: &str, message: Option<&str>) -> Result<MergeOutcome, GitError> {
        let ours_id = self
            .refs
            .head_commit()?
            .ok_or_else(|| GitError::NotFound("HEAD is unborn".to_string()))?;
        let theirs_id = self.resolve_commit(source_ref)?;

        let report = self.status()?;
        if report.has_uncommitted_changes() {
            let path = report
                .staged
                .first()
                .map(|(p, _)| p.clone())
                .or_else(|| report.unstaged.first().map(|(p, _)| p.clone()))
                .unwrap_or_default();
            return Err(GitError::LocalChangesWouldBeLost(path.display().to_string()));
        }

        let base_id = self
            .merge_base(&ours_id, &theirs_id)?
            .ok_or_else(|| {
                GitError::CustomError("refusing to merge unrelated histories".to_string())
            })?;

        if base_id == theirs_id {
            debug!(%theirs_id, "already up to date");
            return Ok(MergeOutcome::AlreadyUpToDate);
        }
        if base_id == ours_id {
            // fast-forward: move the branch, no merge commit
            self.advance_to(&theirs_id, &ours_id)?;
            self.materialize_commit(&theirs_id)?;
            debug!(%theirs_id, "fast-forward");
            return Ok(MergeOutcome::FastForward(theirs_id));
        }

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Merge branch '{source_ref}'"));
        self.three_way_merge(base_id, ours_id, theirs_id, &message)
    }

    fn advance_to(&self, new_id: &ObjectHash, old_id: &ObjectHash) -> Result<(), GitError> {
        match self.refs.head()? {
            Head::Branch(name) => self.refs.update(
                &format!("refs/heads/{name}"),
                new_id,
                RefExpectation::Exactly(*old_id),
            ),
            Head::Detached(_) => self.refs.set_head(Head::Detached(*new_id)),
        }
    }

    fn three_way_merge(
        &self,
        base_id: ObjectHash,
        ours_id: ObjectHash,
        theirs_id: ObjectHash,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        let base = self.tree_entry_map(&base_id)?;
        let ours = self.tree_entry_map(&ours_id)?;
        let theirs = self.tree_entry_map(&theirs_id)?;

        let mut paths: BTreeSet<PathBuf> = BTreeSet::new();
        paths.extend(base.keys().cloned());
        paths.extend(ours.keys().cloned());
        paths.extend(theirs.keys().cloned());

        let mut merged: Vec<(PathBuf, TreeEntry)> = Vec::new();
        let mut conflicts: Vec<Conflict> = Vec::new();

        for path in paths {
            let b = base.get(&path).copied();
            let o = ours.get(&path).copied();
            let t = theirs.get(&path).copied();

            if o == t {
                // untouched, changed identically, or deleted on both sides
                if let Some(entry) = o {
                    merged.push((path, entry));
                }
                continue;
            }
            if o == b {
                // only their side changed (possibly a deletion)
                if let Some(entry) = t {
                    merged.push((path, entry));
                }
                continue;
            }
            if t == b {
                // only our side changed
                if let Some(entry) = o {
                    merged.push((path, entry));
                }
                continue;
            }

            // both sides changed, differently
            match (o, t) {
                (Some(our_entry), Some(their_entry)) => {
                    let base_bytes = match b {
                        Some((hash, _)) => self.storage.load::<Blob>(&hash)?.data,
                        None => Vec::new(),
                    };
                    let our_blob: Blob = self.storage.load(&our_entry.0)?;
                    let their_blob: Blob = self.storage.load(&their_entry.0)?;

                    if Diff::is_binary(&base_bytes)
                        || Diff::is_binary(&our_blob.data)
                        || Diff::is_binary(&their_blob.data)
                    {
                        // binary content cannot be line-merged; keep ours in
                        // the worktree and record the conflict
                        conflicts.push(Conflict {
                            path,
                            base: b,
                            ours: o,
                            theirs: t,
                            content: our_blob.data,
                        });
                        continue;
                    }

                    let result = merge_three_way(
                        &String::from_utf8_lossy(&base_bytes),
                        &String::from_utf8_lossy(&our_blob.data),
                        &String::from_utf8_lossy(&their_blob.data),
                        "ours",
                        "base",
                        "theirs",
                    );
                    if result.is_clean() {
                        let blob = Blob::from_content_bytes(result.content.into_bytes());
                        self.storage.save(&blob)?;
                        let mode = if our_entry.1 == TreeItemMode::BlobExecutable
                            || their_entry.1 == TreeItemMode::BlobExecutable
                        {
                            TreeItemMode::BlobExecutable
                        } else {
                            our_entry.1
                        };
                        merged.push((path, (blob.id, mode)));
                    } else {
                        conflicts.push(Conflict {
                            path,
                            base: b,
                            ours: o,
                            theirs: t,
                            content: result.content.into_bytes(),
                        });
                    }
                }
                // modify/delete: the surviving side's content stays in the
                // worktree so nothing is silently lost
                (Some(our_entry), None) => {
                    let our_blob: Blob = self.storage.load(&our_entry.0)?;
                    conflicts.push(Conflict {
                        path,
                        base: b,
                        ours: o,
                        theirs: None,
                        content: our_blob.data,
                    });
                }
                (None, Some(their_entry)) => {
                    let their_blob: Blob = self.storage.load(&their_entry.0)?;
                    conflicts.push(Conflict {
                        path,
                        base: b,
                        ours: None,
                        theirs: t,
                        content: their_blob.data,
                    });
                }
                (None, None) => unreachable!("o == t handled above"),
            }
        }

        if conflicts.is_empty() {
            return self.conclude_clean_merge(merged, ours_id, theirs_id, message);
        }

        self.record_conflicted_merge(merged, conflicts, theirs_id, message)
    }

    /// Build the merged tree, create the two-parent commit, advance the
    /// branch and materialize the result.
    fn conclude_clean_merge(
        &self,
        merged: Vec<(PathBuf, TreeEntry)>,
        ours_id: ObjectHash,
        theirs_id: ObjectHash,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        let index = self.index_from_entries(&merged)?;
        let tree = self.build_tree(&index)?;

        let author = self.default_signature(
            crate::internal::object::signature::SignatureType::Author,
        );
        let committer = self.default_signature(
            crate::internal::object::signature::SignatureType::Committer,
        );
        let commit = crate::internal::object::commit::Commit::new(
            author,
            committer,
            tree.id,
            vec![ours_id, theirs_id],
            &format!("\n{message}"),
        )?;
        self.storage.save(&commit)?;

        self.advance_to(&commit.id, &ours_id)?;
        self.materialize_commit(&commit.id)?;
        debug!(id = %commit.id, "merge commit created");
        Ok(MergeOutcome::Merged(commit.id))
    }

    /// Leave the repository in the conflicted state the caller can
    /// inspect: marked-up worktree, staged conflict entries, MERGE_HEAD
    /// and MERGE_MSG.
    fn record_conflicted_merge(
        &self,
        merged: Vec<(PathBuf, TreeEntry)>,
        conflicts: Vec<Conflict>,
        theirs_id: ObjectHash,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        let mut index = self.index_from_entries(&merged)?;

        // apply clean deletions to the worktree before anything else
        let keep: std::collections::HashSet<PathBuf> = merged
            .iter()
            .map(|(path, _)| path.clone())
            .chain(conflicts.iter().map(|c| c.path.clone()))
            .collect();
        let old_index = self.load_index()?;
        for tracked in old_index.tracked_files() {
            if !keep.contains(&tracked) {
                let abs = self.work_dir().join(&tracked);
                match fs::remove_file(&abs) {
                    Ok(()) => utils::clear_empty_dir(&abs, self.work_dir()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(GitError::IOError(e)),
                }
            }
        }

        // cleanly merged paths reach the worktree too
        for (path, (hash, mode)) in &merged {
            self.write_blob_to_worktree(hash, path, *mode)?;
            index.update(IndexEntry::new_from_file(path, *hash, self.work_dir())?);
        }

        let conflict_count = conflicts.len();
        for conflict in conflicts {
            let abs = self.work_dir().join(&conflict.path);
            utils::write_file(&conflict.content, &abs)?;

            let name = conflict.path.to_string_lossy().to_string();
            let stage_entry = |entry: Option<TreeEntry>| -> Result<Option<IndexEntry>, GitError> {
                entry
                    .map(|(hash, mode)| {
                        let blob: Blob = self.storage.load(&hash)?;
                        let mut e =
                            IndexEntry::new_from_blob(name.clone(), hash, blob.data.len() as u32);
                        e.mode = mode.to_unix_mode();
                        Ok(e)
                    })
                    .transpose()
            };
            index.add_conflict(
                &name,
                stage_entry(conflict.base)?,
                stage_entry(conflict.ours)?,
                stage_entry(conflict.theirs)?,
            );
        }
        self.save_index(&index)?;

        fs::write(self.merge_head_path(), format!("{theirs_id}\n"))?;
        fs::write(self.merge_msg_path(), format!("{message}\n"))?;

        debug!(conflicts = conflict_count, "merge stopped on conflicts");
        Err(GitError::MergeConflict(conflict_count))
    }

    fn tree_entry_map(
        &self,
        commit_id: &ObjectHash,
    ) -> Result<HashMap<PathBuf, TreeEntry>, GitError> {
        Ok(self
            .commit_plain_items(commit_id)?
            .into_iter()
            .map(|(path, hash, mode)| (path, (hash, mode)))
            .collect())
    }

    /// An in-memory index over `(path, entry)` pairs, for tree building.
    fn index_from_entries(
        &self,
        entries: &[(PathBuf, TreeEntry)],
    ) -> Result<Index, GitError> {
        let mut index = Index::new();
        for (path, (hash, mode)) in entries {
            let name = path
                .to_str()
                .ok_or_else(|| GitError::ConversionError(format!("non-UTF8 path: {path:?}")))?
                .to_string();
            let blob: Blob = self.storage.load(hash)?;
            let mut entry = IndexEntry::new_from_blob(name, *hash, blob.data.len() as u32);
            entry.mode = mode.to_unix_mode();
            index.add(entry);
        }
        Ok(index)
    }
}
