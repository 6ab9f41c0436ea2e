//! Candidates, buckets and confirmed duplicate groups.
//!
//! # Overview
//!
//! The finder works on two file universes, *left* and *right*. When both are
//! the same set of files the search is a self-duplicate search; otherwise
//! only groups spanning both sides are reported. Each file carries a [`Side`]
//! saying which universe(s) it came from. A path present in both universes is
//! [`Side::Both`] and is only read once.
//!
//! A [`Bucket`] is a list of candidates sharing some key (size, prehash,
//! full hash). [`bucket_is_viable`] decides whether a bucket can still hold a
//! match and is applied after every stage.
//!
//! # Example
//!
//! ```
//! use copyall::duplicates::{DuplicateGroup, DuplicateGroupSet};
//! use std::path::PathBuf;
//!
//! let group = DuplicateGroup::same_universe(
//!     10,
//!     vec![PathBuf::from("/a/1.txt"), PathBuf::from("/a/2.txt")],
//! );
//! let set = DuplicateGroupSet::new(vec![group], true);
//!
//! assert_eq!(set.duplicate_count(), 1);
//! assert_eq!(set.wasted_space(), 10);
//! assert_eq!(set.removable(), vec![PathBuf::from("/a/2.txt")]);
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Which universe(s) a candidate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Only in the left universe.
    Left,
    /// Only in the right universe.
    Right,
    /// In both universes (always the case for a self search).
    Both,
}

impl Side {
    /// Whether the candidate counts toward the left universe.
    #[must_use]
    pub fn is_left(self) -> bool {
        matches!(self, Self::Left | Self::Both)
    }

    /// Whether the candidate counts toward the right universe.
    #[must_use]
    pub fn is_right(self) -> bool {
        matches!(self, Self::Right | Self::Both)
    }

    /// Combine memberships of the same path.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Both
        }
    }
}

/// A file still in the running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path.
    pub path: PathBuf,
    /// Size in bytes, known from stage one onward.
    pub size: u64,
    /// Universe membership.
    pub side: Side,
}

impl Candidate {
    /// Create a candidate.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, side: Side) -> Self {
        Self { path, size, side }
    }
}

/// Candidates sharing a key.
pub type Bucket = Vec<Candidate>;

/// Whether `bucket` could still contain a reportable group.
///
/// At least two distinct files are needed, with at least one on each side.
/// For a self search every candidate is [`Side::Both`], so this reduces to
/// the size check.
#[must_use]
pub fn bucket_is_viable(bucket: &[Candidate]) -> bool {
    bucket.len() >= 2
        && bucket.iter().any(|c| c.side.is_left())
        && bucket.iter().any(|c| c.side.is_right())
}

/// A confirmed set of content-identical files.
///
/// `left` holds the members from the left universe and `right` those from the
/// right universe. In a self search both lists are the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Size in bytes shared by every member.
    pub size: u64,
    /// Left-universe members, sorted.
    pub left: Vec<PathBuf>,
    /// Right-universe members, sorted.
    pub right: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Group for a self search: both sides reference the same members.
    #[must_use]
    pub fn same_universe(size: u64, mut members: Vec<PathBuf>) -> Self {
        members.sort();
        Self {
            size,
            left: members.clone(),
            right: members,
        }
    }

    /// Build a group from verified candidates, splitting by side.
    #[must_use]
    pub fn from_candidates(size: u64, members: &[Candidate]) -> Self {
        let mut left: Vec<PathBuf> = members
            .iter()
            .filter(|c| c.side.is_left())
            .map(|c| c.path.clone())
            .collect();
        let mut right: Vec<PathBuf> = members
            .iter()
            .filter(|c| c.side.is_right())
            .map(|c| c.path.clone())
            .collect();
        left.sort();
        right.sort();
        Self { size, left, right }
    }

    /// Every distinct member path.
    #[must_use]
    pub fn members(&self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = self.left.iter().chain(&self.right).cloned().collect();
        all.sort();
        all.dedup();
        all
    }

    /// Number of distinct member files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members().len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Whether `path` belongs to this group.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.left.iter().chain(&self.right).any(|p| p == path)
    }
}

/// The detector's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateGroupSet {
    /// Groups sorted by size (largest first), then by first member.
    pub groups: Vec<DuplicateGroup>,
    /// Whether the two universes were the same set of files.
    pub same_universe: bool,
}

impl DuplicateGroupSet {
    /// Wrap `groups` in canonical order.
    #[must_use]
    pub fn new(mut groups: Vec<DuplicateGroup>, same_universe: bool) -> Self {
        groups.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.left.cmp(&b.left)));
        Self {
            groups,
            same_universe,
        }
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no duplicates were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterate over groups.
    pub fn iter(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter()
    }

    /// Files that can go without losing any content.
    ///
    /// Self search: every member but the first of each group. Cross search:
    /// the right-side members not also on the left, since every left member
    /// is kept.
    #[must_use]
    pub fn removable(&self) -> Vec<PathBuf> {
        self.removable_with_size()
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    fn removable_with_size(&self) -> Vec<(PathBuf, u64)> {
        let mut out = Vec::new();
        for group in &self.groups {
            if self.same_universe {
                out.extend(group.left.iter().skip(1).map(|p| (p.clone(), group.size)));
            } else {
                let kept: HashSet<&PathBuf> = group.left.iter().collect();
                out.extend(
                    group
                        .right
                        .iter()
                        .filter(|p| !kept.contains(p))
                        .map(|p| (p.clone(), group.size)),
                );
            }
        }
        out
    }

    /// Number of removable files.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.removable_with_size().len()
    }

    /// Bytes reclaimed by removing every removable file.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.removable_with_size().iter().map(|(_, size)| size).sum()
    }
}

impl<'a> IntoIterator for &'a DuplicateGroupSet {
    type Item = &'a DuplicateGroup;
    type IntoIter = std::slice::Iter<'a, DuplicateGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}
