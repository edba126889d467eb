//! Path-keyed differences between two store snapshots.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::Store;
use crate::value::StoreValue;
use crate::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatchOp {
    Add { value: StoreValue },
    Remove { old: StoreValue },
    Replace { old: StoreValue, new: StoreValue },
}

impl PatchOp {
    /// Value after the change, `None` for removals.
    pub fn new_value(&self) -> Option<&StoreValue> {
        match self {
            PatchOp::Add { value } => Some(value),
            PatchOp::Replace { new, .. } => Some(new),
            PatchOp::Remove { .. } => None,
        }
    }

    pub fn old_value(&self) -> Option<&StoreValue> {
        match self {
            PatchOp::Add { .. } => None,
            PatchOp::Replace { old, .. } | PatchOp::Remove { old } => Some(old),
        }
    }

    pub fn invert(&self) -> PatchOp {
        match self {
            PatchOp::Add { value } => PatchOp::Remove { old: value.clone() },
            PatchOp::Remove { old } => PatchOp::Add { value: old.clone() },
            PatchOp::Replace { old, new } => PatchOp::Replace {
                old: new.clone(),
                new: old.clone(),
            },
        }
    }
}

/// Only paths whose value actually differs are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: BTreeMap<Path, PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn get(&self, path: &Path) -> Option<&PatchOp> {
        self.ops.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.ops.contains_key(path)
    }

    /// True if any entry at or below `root` changed.
    pub fn touches(&self, root: &Path) -> bool {
        self.ops
            .range(root.clone()..)
            .next()
            .is_some_and(|(path, _)| path.starts_with(root))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.ops.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &PatchOp)> {
        self.ops.iter()
    }

    pub fn insert(&mut self, path: Path, op: PatchOp) {
        self.ops.insert(path, op);
    }

    /// The patch that undoes this one.
    pub fn invert(&self) -> Patch {
        Patch {
            ops: self
                .ops
                .iter()
                .map(|(path, op)| (path.clone(), op.invert()))
                .collect(),
        }
    }
}

impl FromIterator<(Path, PatchOp)> for Patch {
    fn from_iter<I: IntoIterator<Item = (Path, PatchOp)>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

/// Diff two snapshots, restricted to entries at or below `scope`.
///
/// Both stores are ordered by path and every subtree is contiguous, so the
/// walk only visits the scope's range.
pub fn diff(before: &Store, after: &Store, scope: Option<&Path>) -> Patch {
    let mut patch = Patch::new();
    if before.ptr_eq(after) {
        return patch;
    }
    let root = scope.cloned().unwrap_or_default();
    let mut left = before.subtree(&root).peekable();
    let mut right = after.subtree(&root).peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((old_path, _)), Some((new_path, _))) => old_path.cmp(new_path),
        };
        match order {
            Ordering::Less => {
                if let Some((path, old)) = left.next() {
                    patch.insert(path.clone(), PatchOp::Remove { old: old.clone() });
                }
            }
            Ordering::Greater => {
                if let Some((path, value)) = right.next() {
                    patch.insert(path.clone(), PatchOp::Add { value: value.clone() });
                }
            }
            Ordering::Equal => {
                if let (Some((path, old)), Some((_, new))) = (left.next(), right.next()) {
                    if old != new {
                        patch.insert(
                            path.clone(),
                            PatchOp::Replace {
                                old: old.clone(),
                                new: new.clone(),
                            },
                        );
                    }
                }
            }
        }
    }
    patch
}
