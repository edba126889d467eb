//! Persistent path-addressed store.
//!
//! A [`Store`] is an immutable snapshot backed by `im::OrdMap`: cloning is
//! O(1) and a write copies only the spine from the root to the entry.
//! Batched writes go through a [`TransientStore`] guard, which holds the only
//! mutable borrow of its store until it is turned into a [`Patch`].

use im::OrdMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::patch::{diff, Patch};
use crate::value::{FromStoreValue, StoreValue};
use crate::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store {
    entries: OrdMap<Path, StoreValue>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value at `path`. A missing entry is a caller bug, never a default.
    pub fn get(&self, path: &Path) -> Result<&StoreValue, StoreError> {
        self.entries
            .get(path)
            .ok_or_else(|| StoreError::PathNotFound(path.clone()))
    }

    pub fn try_get(&self, path: &Path) -> Option<&StoreValue> {
        self.entries.get(path)
    }

    pub fn count(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get_as<T: FromStoreValue>(&self, path: &Path) -> Result<T, StoreError> {
        read_as(self.get(path)?, path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &StoreValue)> {
        self.entries.iter()
    }

    /// Entries at or below `root`, in path order.
    pub fn subtree<'a>(
        &'a self,
        root: &'a Path,
    ) -> impl Iterator<Item = (&'a Path, &'a StoreValue)> + 'a {
        self.entries
            .range(root.clone()..)
            .take_while(move |(path, _)| path.starts_with(root))
    }

    /// True if both snapshots share the same root node.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        self.entries.ptr_eq(&other.entries)
    }

    /// Open a batch of writes. Nothing is visible through `self` until
    /// [`TransientStore::create_patch`] runs; dropping the guard discards it.
    pub fn begin_transient(&mut self) -> TransientStore<'_> {
        let working = self.entries.clone();
        TransientStore {
            target: self,
            working,
        }
    }
}

impl FromIterator<(Path, StoreValue)> for Store {
    fn from_iter<I: IntoIterator<Item = (Path, StoreValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn read_as<T: FromStoreValue>(value: &StoreValue, path: &Path) -> Result<T, StoreError> {
    T::from_store_value(value).ok_or_else(|| StoreError::TypeMismatch {
        path: path.clone(),
        expected: T::TYPE_NAME,
        found: value.type_name(),
    })
}

/// Mutable batching view over a [`Store`].
pub struct TransientStore<'a> {
    target: &'a mut Store,
    working: OrdMap<Path, StoreValue>,
}

impl<'a> TransientStore<'a> {
    pub fn get(&self, path: &Path) -> Result<&StoreValue, StoreError> {
        self.working
            .get(path)
            .ok_or_else(|| StoreError::PathNotFound(path.clone()))
    }

    pub fn count(&self, path: &Path) -> bool {
        self.working.contains_key(path)
    }

    pub fn get_as<T: FromStoreValue>(&self, path: &Path) -> Result<T, StoreError> {
        read_as(self.get(path)?, path)
    }

    pub fn set(&mut self, path: Path, value: impl Into<StoreValue>) {
        self.working.insert(path, value.into());
    }

    pub fn erase(&mut self, path: &Path) -> Option<StoreValue> {
        self.working.remove(path)
    }

    /// Remove the entry at `root` and every entry below it.
    pub fn clear(&mut self, root: &Path) -> usize {
        let doomed: Vec<Path> = self
            .working
            .range(root.clone()..)
            .take_while(|(path, _)| path.starts_with(root))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &doomed {
            self.working.remove(path);
        }
        doomed.len()
    }

    /// Publish the batch into the store and return what changed under
    /// `scope` (everything for `None`).
    pub fn create_patch(self, scope: Option<&Path>) -> Patch {
        let TransientStore { target, working } = self;
        let next = Store { entries: working };
        let patch = diff(target, &next, scope);
        *target = next;
        patch
    }

    pub fn commit(self) -> Patch {
        self.create_patch(None)
    }
}
