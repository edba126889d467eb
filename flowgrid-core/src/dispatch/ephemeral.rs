use std::collections::BTreeMap;

use flowgrid_types::{Patch, Path, Store, StoreAction, StoreValue};

/// Values written by ephemeral actions, layered over the saved store.
///
/// The live store is always the saved store with these entries on top. They
/// survive commits and history moves, and a saved write to the same path
/// takes the entry back. `None` records an ephemeral erase.
#[derive(Debug, Default)]
pub(crate) struct EphemeralOverlay {
    entries: BTreeMap<Path, Option<StoreValue>>,
}

impl EphemeralOverlay {
    /// Remember what an ephemeral batch changed on the live store.
    pub(crate) fn record(&mut self, patch: &Patch) {
        for (path, op) in patch.iter() {
            self.entries.insert(path.clone(), op.new_value().cloned());
        }
    }

    /// Drop the entries a saved batch wrote, either through a changed value
    /// in `written` or by targeting the path. Returns the dropped paths.
    pub(crate) fn release<'a>(
        &mut self,
        written: &Patch,
        actions: impl IntoIterator<Item = &'a StoreAction>,
    ) -> Vec<Path> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let actions: Vec<&StoreAction> = actions.into_iter().collect();
        let released: Vec<Path> = self
            .entries
            .keys()
            .filter(|path| written.contains(path) || actions.iter().any(|a| overwrites(a, path)))
            .cloned()
            .collect();
        for path in &released {
            self.entries.remove(path);
        }
        released
    }

    /// `saved` with the ephemeral entries on top.
    pub(crate) fn apply(&self, saved: &Store) -> Store {
        let mut live = saved.clone();
        if self.entries.is_empty() {
            return live;
        }
        let mut transient = live.begin_transient();
        for (path, value) in &self.entries {
            match value {
                Some(value) => transient.set(path.clone(), value.clone()),
                None => {
                    transient.erase(path);
                }
            }
        }
        transient.commit();
        live
    }
}

fn overwrites(action: &StoreAction, path: &Path) -> bool {
    match action {
        StoreAction::Clear { path: root } => path.starts_with(root),
        StoreAction::SetValues { values } => values.iter().any(|(p, _)| p == path),
        StoreAction::ApplyPatch { patch } => patch.contains(path),
        other => other.path() == Some(path),
    }
}
