//! Ancestry queries over the commit graph: reachability and merge-base
//! discovery, both walking every parent (first-parent traversal is not
//! enough for histories with merges).

use std::collections::{HashSet, VecDeque};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::commit::Commit,
    repo::Repository,
};

impl Repository {
    /// Whether commit `a` appears in the ancestor closure of `b`
    /// (inclusive: a commit is an ancestor of itself).
    pub fn is_ancestor(&self, a: &ObjectHash, b: &ObjectHash) -> Result<bool, GitError> {
        if a == b {
            return Ok(true);
        }
        let mut visited: HashSet<ObjectHash> = HashSet::new();
        let mut queue: VecDeque<ObjectHash> = VecDeque::new();
        queue.push_back(*b);
        visited.insert(*b);

        while let Some(current) = queue.pop_front() {
            let commit: Commit = self.storage.load(&current)?;
            for parent in commit.parent_commit_ids {
                if parent == *a {
                    return Ok(true);
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(false)
    }

    /// A lowest common ancestor of `a` and `b`, or `None` for disjoint
    /// histories.
    ///
    /// Two frontiers expand breadth-first from both commits; the first
    /// commit popped from one frontier that the other side has already
    /// visited is the answer. The pop order is fixed by the seed order
    /// and parent order, and the meeting test runs on both frontiers
    /// every round, so the choice is deterministic and symmetric.
    pub fn merge_base(
        &self,
        a: &ObjectHash,
        b: &ObjectHash,
    ) -> Result<Option<ObjectHash>, GitError> {
        if a == b {
            return Ok(Some(*a));
        }

        let mut visited_a: HashSet<ObjectHash> = HashSet::from([*a]);
        let mut visited_b: HashSet<ObjectHash> = HashSet::from([*b]);
        let mut frontier_a: VecDeque<ObjectHash> = VecDeque::from([*a]);
        let mut frontier_b: VecDeque<ObjectHash> = VecDeque::from([*b]);

        while !frontier_a.is_empty() || !frontier_b.is_empty() {
            if let Some(current) = frontier_a.pop_front() {
                if visited_b.contains(&current) {
                    return Ok(Some(current));
                }
                let commit: Commit = self.storage.load(&current)?;
                for parent in commit.parent_commit_ids {
                    if visited_a.insert(parent) {
                        if visited_b.contains(&parent) {
                            return Ok(Some(parent));
                        }
                        frontier_a.push_back(parent);
                    }
                }
            }
            if let Some(current) = frontier_b.pop_front() {
                if visited_a.contains(&current) {
                    return Ok(Some(current));
                }
                let commit: Commit = self.storage.load(&current)?;
                for parent in commit.parent_commit_ids {
                    if visited_b.insert(parent) {
                        if visited_a.contains(&parent) {
                            return Ok(Some(parent));
                        }
                        frontier_b.push_back(parent);
                    }
                }
            }
        }
        Ok(None)
    }
}
