//! Working-tree snapshots and the delta between two of them.

use std::collections::BTreeSet;

use serde::Serialize;

/// Point-in-time view of `git status`.
///
/// `tracked_changes` and `untracked` are disjoint: a path is either known to
/// git with pending modifications, or new.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub tracked_changes: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
}

/// Paths that appeared in a snapshot relative to a baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub changed: Vec<String>,
    pub created: Vec<String>,
}

impl SnapshotDiff {
    pub fn has_changed(&self) -> bool {
        !self.changed.is_empty() || !self.created.is_empty()
    }
}

impl Snapshot {
    /// Partition porcelain (v1) status output into tracked and untracked paths.
    pub fn from_porcelain(output: &str) -> Self {
        let mut snapshot = Self::default();
        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_status_line(line) {
                StatusLine::Untracked(path) => snapshot.untracked.insert(path),
                StatusLine::Tracked(path) => snapshot.tracked_changes.insert(path),
            };
        }
        snapshot
    }

    pub fn is_clean(&self) -> bool {
        self.tracked_changes.is_empty() && self.untracked.is_empty()
    }
}

/// Elements of `current` absent from `baseline`, per set.
pub fn diff(baseline: &Snapshot, current: &Snapshot) -> SnapshotDiff {
    SnapshotDiff {
        changed: current
            .tracked_changes
            .difference(&baseline.tracked_changes)
            .cloned()
            .collect(),
        created: current
            .untracked
            .difference(&baseline.untracked)
            .cloned()
            .collect(),
    }
}

pub fn has_changed(baseline: &Snapshot, current: &Snapshot) -> bool {
    diff(baseline, current).has_changed()
}

enum StatusLine {
    Untracked(String),
    Tracked(String),
}

fn parse_status_line(line: &str) -> StatusLine {
    use std::sync::LazyLock;
    static CODE_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"^\s*[A-Z]+\s+").unwrap());

    if let Some(path) = line.strip_prefix("??") {
        return StatusLine::Untracked(path.trim().to_string());
    }
    let mut path = CODE_RE.replace(line, "").trim().to_string();
    if let Some((_, new)) = path.split_once(" -> ") {
        path = new.trim().to_string();
    }
    StatusLine::Tracked(path)
}
