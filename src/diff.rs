//! Unified diff generation and line-level merging: Myers-based unified
//! diffs for pairs of blob sets, rename similarity scoring, and the
//! diff3-style three-way merge used by the merge machinery.

use std::{
    collections::BTreeMap,
    fmt::Write,
    path::{Path, PathBuf},
};

use similar::{Algorithm, DiffOp, TextDiff, capture_diff_slices};

use crate::hash::ObjectHash;

/// How many leading bytes are probed for NUL when deciding a file is binary.
const BINARY_PROBE_LEN: usize = 8 * 1024;

/// Result item for a single file diff:
/// - `path`: logical file path
/// - `data`: unified diff text or a binary marker
#[derive(Debug, Clone)]
pub struct DiffItem {
    /// The file path being diffed.
    pub path: String,
    /// The complete unified diff output string for that file.
    pub data: String,
}

/// Unified diff generator and helpers.
pub struct Diff;

impl Diff {
    /// Diff two `(path, blob)` snapshots, honoring an optional path
    /// filter and emitting unified hunks with the given context width.
    ///
    /// Both snapshots are folded into one ordered table keyed by path,
    /// so each path is visited once and the output comes back sorted.
    pub fn diff<F>(
        old_blobs: Vec<(PathBuf, ObjectHash)>,
        new_blobs: Vec<(PathBuf, ObjectHash)>,
        context: usize,
        filter: Vec<PathBuf>,
        read_content: F,
    ) -> Vec<DiffItem>
    where
        F: Fn(&PathBuf, &ObjectHash) -> Vec<u8>,
    {
        let mut table: BTreeMap<PathBuf, (Option<ObjectHash>, Option<ObjectHash>)> =
            BTreeMap::new();
        for (path, id) in old_blobs {
            table.entry(path).or_default().0 = Some(id);
        }
        for (path, id) in new_blobs {
            table.entry(path).or_default().1 = Some(id);
        }

        let in_scope =
            |path: &PathBuf| filter.is_empty() || filter.iter().any(|p| path.starts_with(p));

        let mut items = Vec::new();
        for (path, (old_id, new_id)) in table {
            if old_id == new_id || !in_scope(&path) {
                continue;
            }
            let before = old_id.map(|id| read_content(&path, &id));
            let after = new_id.map(|id| read_content(&path, &id));
            let data = Self::unified_for_file(
                &path,
                before.as_deref(),
                after.as_deref(),
                context,
            );
            items.push(DiffItem {
                path: path.to_string_lossy().to_string(),
                data,
            });
        }
        items
    }

    /// A file is binary when a NUL byte appears in its first 8 KiB.
    pub fn is_binary(bytes: &[u8]) -> bool {
        let probe = &bytes[..bytes.len().min(BINARY_PROBE_LEN)];
        probe.contains(&0)
    }

    /// Line-based similarity in `[0, 1]`, used for rename detection.
    pub fn similarity(old_bytes: &[u8], new_bytes: &[u8]) -> f32 {
        if old_bytes == new_bytes {
            return 1.0;
        }
        if Self::is_binary(old_bytes) || Self::is_binary(new_bytes) {
            return 0.0;
        }
        let old_text = String::from_utf8_lossy(old_bytes);
        let new_text = String::from_utf8_lossy(new_bytes);
        TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_lines(old_text.as_ref(), new_text.as_ref())
            .ratio()
    }

    /// The unified hunk sequence for one file. `None` on a side means the
    /// file is absent there (a creation or a deletion), rendered with the
    /// conventional `/dev/null` label.
    pub fn unified_for_file(
        path: &Path,
        before: Option<&[u8]>,
        after: Option<&[u8]>,
        context: usize,
    ) -> String {
        if before.is_some_and(Self::is_binary) || after.is_some_and(Self::is_binary) {
            return "Binary files differ\n".to_string();
        }

        let from_label = match before {
            Some(_) => format!("a/{}", path.display()),
            None => "/dev/null".to_string(),
        };
        let to_label = match after {
            Some(_) => format!("b/{}", path.display()),
            None => "/dev/null".to_string(),
        };

        let old_text = String::from_utf8_lossy(before.unwrap_or_default());
        let new_text = String::from_utf8_lossy(after.unwrap_or_default());

        // Myers line diff; the shortest-script reconstruction emits
        // deletions before insertions, keeping output deterministic.
        let line_diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_lines(old_text.as_ref(), new_text.as_ref());

        let mut rendered = format!("--- {from_label}\n+++ {to_label}\n");
        // Writing into a String cannot fail; allocation errors abort elsewhere.
        let _ = write!(
            rendered,
            "{}",
            line_diff.unified_diff().context_radius(context)
        );
        rendered
    }
}

/// Outcome of a three-way line merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Merged content; conflicted regions carry diff3-style markers.
    pub content: String,
    /// Number of conflicted regions (0 = clean merge).
    pub conflicts: usize,
}

impl MergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

/// One region of the base replaced by a side.
#[derive(Debug, Clone)]
struct SideHunk {
    base_start: usize,
    base_end: usize,
    lines: Vec<String>,
}

/// diff3-style three-way line merge of `ours` and `theirs` against `base`.
///
/// Non-overlapping changes are taken automatically; overlapping changes
/// that differ produce a conflict region bracketed by
/// `<<<<<<< <ours_label>`, `||||||| <base_label>`, `=======`,
/// `>>>>>>> <theirs_label>` markers.
pub fn merge_three_way(
    base: &str,
    ours: &str,
    theirs: &str,
    ours_label: &str,
    base_label: &str,
    theirs_label: &str,
) -> MergeResult {
    let base_lines: Vec<&str> = split_lines(base);
    let ours_lines: Vec<&str> = split_lines(ours);
    let theirs_lines: Vec<&str> = split_lines(theirs);

    let ours_hunks = side_hunks(&base_lines, &ours_lines);
    let theirs_hunks = side_hunks(&base_lines, &theirs_lines);

    let mut out = String::new();
    let mut conflicts = 0usize;
    let mut base_pos = 0usize;
    let (mut i, mut j) = (0usize, 0usize);

    while i < ours_hunks.len() || j < theirs_hunks.len() {
        let next_ours = ours_hunks.get(i);
        let next_theirs = theirs_hunks.get(j);

        // Decide which hunk comes first in base order.
        let hunk = match (next_ours, next_theirs) {
            (Some(o), Some(t)) => {
                if hunks_collide(o, t) {
                    // Coalesce every hunk from either side that touches the
                    // growing conflict region.
                    let mut lo = o.base_start.min(t.base_start);
                    let mut hi = o.base_end.max(t.base_end);
                    let (mut oi, mut tj) = (i, j);
                    loop {
                        let mut grown = false;
                        while let Some(h) = ours_hunks.get(oi) {
                            if region_touches(h, lo, hi) {
                                lo = lo.min(h.base_start);
                                hi = hi.max(h.base_end);
                                oi += 1;
                                grown = true;
                            } else {
                                break;
                            }
                        }
                        while let Some(h) = theirs_hunks.get(tj) {
                            if region_touches(h, lo, hi) {
                                lo = lo.min(h.base_start);
                                hi = hi.max(h.base_end);
                                tj += 1;
                                grown = true;
                            } else {
                                break;
                            }
                        }
                        if !grown {
                            break;
                        }
                    }

                    emit_lines(&mut out, &base_lines[base_pos..lo]);

                    let ours_region = apply_region(&base_lines, &ours_hunks[i..oi], lo, hi);
                    let theirs_region = apply_region(&base_lines, &theirs_hunks[j..tj], lo, hi);
                    let base_region: Vec<String> =
                        base_lines[lo..hi].iter().map(|s| s.to_string()).collect();

                    if ours_region == theirs_region {
                        // both sides changed identically
                        emit_owned(&mut out, &ours_region);
                    } else if ours_region == base_region {
                        emit_owned(&mut out, &theirs_region);
                    } else if theirs_region == base_region {
                        emit_owned(&mut out, &ours_region);
                    } else {
                        conflicts += 1;
                        ensure_newline(&mut out);
                        out.push_str(&format!("<<<<<<< {ours_label}\n"));
                        emit_owned(&mut out, &ours_region);
                        ensure_newline(&mut out);
                        out.push_str(&format!("||||||| {base_label}\n"));
                        emit_owned(&mut out, &base_region);
                        ensure_newline(&mut out);
                        out.push_str("=======\n");
                        emit_owned(&mut out, &theirs_region);
                        ensure_newline(&mut out);
                        out.push_str(&format!(">>>>>>> {theirs_label}\n"));
                    }

                    base_pos = hi;
                    i = oi;
                    j = tj;
                    continue;
                }
                if o.base_start <= t.base_start {
                    i += 1;
                    o
                } else {
                    j += 1;
                    t
                }
            }
            (Some(o), None) => {
                i += 1;
                o
            }
            (None, Some(t)) => {
                j += 1;
                t
            }
            (None, None) => break,
        };

        // A change on one side only: take it as-is.
        emit_lines(&mut out, &base_lines[base_pos..hunk.base_start]);
        for line in &hunk.lines {
            out.push_str(line);
        }
        base_pos = hunk.base_end;
    }

    emit_lines(&mut out, &base_lines[base_pos..]);

    MergeResult {
        content: out,
        conflicts,
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn emit_lines(out: &mut String, lines: &[&str]) {
    for line in lines {
        out.push_str(line);
    }
}

fn emit_owned(out: &mut String, lines: &[String]) {
    for line in lines {
        out.push_str(line);
    }
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// The replaced base regions of one side, from a Myers diff against base.
fn side_hunks(base_lines: &[&str], side_lines: &[&str]) -> Vec<SideHunk> {
    let ops = capture_diff_slices(Algorithm::Myers, base_lines, side_lines);
    let mut hunks = Vec::new();
    for op in ops {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => hunks.push(SideHunk {
                base_start: old_index,
                base_end: old_index + old_len,
                lines: Vec::new(),
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => hunks.push(SideHunk {
                base_start: old_index,
                base_end: old_index,
                lines: side_lines[new_index..new_index + new_len]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => hunks.push(SideHunk {
                base_start: old_index,
                base_end: old_index + old_len,
                lines: side_lines[new_index..new_index + new_len]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
    hunks
}

/// Two hunks collide when their base ranges overlap, or when an insertion
/// touches the other hunk's range.
fn hunks_collide(a: &SideHunk, b: &SideHunk) -> bool {
    let a_empty = a.base_start == a.base_end;
    let b_empty = b.base_start == b.base_end;
    if a_empty || b_empty {
        a.base_start <= b.base_end && b.base_start <= a.base_end
    } else {
        a.base_start < b.base_end && b.base_start < a.base_end
    }
}

fn region_touches(h: &SideHunk, lo: usize, hi: usize) -> bool {
    let probe = SideHunk {
        base_start: lo,
        base_end: hi,
        lines: Vec::new(),
    };
    hunks_collide(h, &probe)
}

/// The side's version of base range `[lo, hi)`: base lines outside the
/// side's hunks plus the hunk replacements, in order.
fn apply_region(base_lines: &[&str], hunks: &[SideHunk], lo: usize, hi: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = lo;
    for hunk in hunks {
        out.extend(base_lines[pos..hunk.base_start].iter().map(|s| s.to_string()));
        out.extend(hunk.lines.iter().cloned());
        pos = hunk.base_end;
    }
    out.extend(base_lines[pos..hi].iter().map(|s| s.to_string()));
    out
}
