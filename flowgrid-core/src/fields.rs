//! Field registry and patch listeners.
//!
//! The registry is the explicit id ↔ path table owned by the application
//! root. After every store transition the dispatcher hands the resulting
//! [`Patch`] to its listeners; a field is "changed" for exactly one cycle when
//! one of its paths appears in that patch, and only then re-reads its value.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use flowgrid_types::{FieldId, FromStoreValue, Patch, Path, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("path {path} is already owned by field {owner}")]
    DuplicatePath { path: Path, owner: FieldId },
    #[error("path {0} listed twice in one registration")]
    RepeatedPath(Path),
    #[error("unknown field {0}")]
    UnknownField(FieldId),
}

/// Receives every patch the dispatcher produces.
pub trait PatchListener {
    fn on_patch(&mut self, patch: &Patch, store: &Store);
}

impl<L: PatchListener> PatchListener for Arc<Mutex<L>> {
    fn on_patch(&mut self, patch: &Patch, store: &Store) {
        // A panic elsewhere must not stop this listener from seeing patches.
        let mut listener = self.lock().unwrap_or_else(|poisoned| {
            log::warn!(target: "flowgrid::fields", "patch listener mutex poisoned; recovering");
            PoisonError::into_inner(poisoned)
        });
        listener.on_patch(patch, store);
    }
}

#[derive(Debug, Default)]
pub struct FieldRegistry {
    next_id: u32,
    owners: BTreeMap<Path, FieldId>,
    paths: HashMap<FieldId, Vec<Path>>,
    changed: HashSet<FieldId>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id owning `paths`. Nothing is registered on error.
    pub fn register(
        &mut self,
        paths: impl IntoIterator<Item = Path>,
    ) -> Result<FieldId, RegistryError> {
        let paths: Vec<Path> = paths.into_iter().collect();
        let mut seen = HashSet::new();
        for path in &paths {
            if let Some(owner) = self.owners.get(path) {
                return Err(RegistryError::DuplicatePath {
                    path: path.clone(),
                    owner: *owner,
                });
            }
            if !seen.insert(path) {
                return Err(RegistryError::RepeatedPath(path.clone()));
            }
        }

        let id = FieldId::new(self.next_id);
        self.next_id += 1;
        for path in &paths {
            self.owners.insert(path.clone(), id);
        }
        self.paths.insert(id, paths);
        Ok(id)
    }

    /// Release `id` and its paths.
    pub fn unregister(&mut self, id: FieldId) -> Result<Vec<Path>, RegistryError> {
        let paths = self
            .paths
            .remove(&id)
            .ok_or(RegistryError::UnknownField(id))?;
        for path in &paths {
            self.owners.remove(path);
        }
        self.changed.remove(&id);
        Ok(paths)
    }

    pub fn owner(&self, path: &Path) -> Option<FieldId> {
        self.owners.get(path).copied()
    }

    pub fn paths(&self, id: FieldId) -> Option<&[Path]> {
        self.paths.get(&id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Start a notification cycle: exactly the fields owning a patched path
    /// become changed. Returns how many.
    pub fn begin_cycle(&mut self, patch: &Patch) -> usize {
        self.changed.clear();
        for path in patch.paths() {
            if let Some(id) = self.owners.get(path) {
                self.changed.insert(*id);
            }
        }
        self.changed.len()
    }

    pub fn is_changed(&self, id: FieldId) -> bool {
        self.changed.contains(&id)
    }

    pub fn changed(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.changed.iter().copied()
    }
}

impl PatchListener for FieldRegistry {
    fn on_patch(&mut self, patch: &Patch, _store: &Store) {
        let changed = self.begin_cycle(patch);
        if changed > 0 {
            log::trace!(target: "flowgrid::fields", "{} field(s) changed", changed);
        }
    }
}

/// Typed cache of one store entry.
#[derive(Debug, Clone)]
pub struct Field<T> {
    path: Path,
    value: Option<T>,
}

impl<T: FromStoreValue> Field<T> {
    /// A field that has not read the store yet.
    pub fn new(path: Path) -> Self {
        Self { path, value: None }
    }

    /// A field initialised from `store`. The entry must exist.
    pub fn bind(path: Path, store: &Store) -> Result<Self, StoreError> {
        let value = store.get_as(&path)?;
        Ok(Self {
            path,
            value: Some(value),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Re-read from `store` only if `patch` touched this field's path.
    /// Returns whether the field changed.
    pub fn refresh(&mut self, patch: &Patch, store: &Store) -> Result<bool, StoreError> {
        let Some(op) = patch.get(&self.path) else {
            return Ok(false);
        };
        self.value = match op.new_value() {
            Some(_) => Some(store.get_as(&self.path)?),
            None => None,
        };
        Ok(true)
    }
}
