//! Linear, indexable gesture history.
//!
//! `snapshots[0]` is the base state and `snapshots[i + 1]` is `snapshots[i]`
//! after `gestures[i]`, so there is always exactly one more snapshot than
//! gestures. Undo, redo and jumps only move the cursor; committing after a
//! rewind drops the redo tail first.

use im::Vector;
use thiserror::Error;

use flowgrid_types::{diff, reduce, Gesture, Patch, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("gesture {gesture}, action {action}: {source}")]
    Replay {
        gesture: usize,
        action: usize,
        #[source]
        source: StoreError,
    },
    #[error("history index {index} past the last snapshot ({last})")]
    IndexOutOfRange { index: usize, last: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    snapshots: Vector<Store>,
    gestures: Vector<Gesture>,
    index: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(Store::default())
    }
}

impl History {
    pub fn new(initial: Store) -> Self {
        Self {
            snapshots: Vector::unit(initial),
            gestures: Vector::new(),
            index: 0,
        }
    }

    /// Rebuild a history by applying `gestures` to `initial` in order.
    pub fn replay(
        initial: Store,
        gestures: impl IntoIterator<Item = Gesture>,
        index: usize,
    ) -> Result<Self, HistoryError> {
        let mut history = Self::new(initial);
        for (number, gesture) in gestures.into_iter().enumerate() {
            let next = apply_gesture(history.last(), &gesture).map_err(|(action, source)| {
                HistoryError::Replay {
                    gesture: number,
                    action,
                    source,
                }
            })?;
            history.snapshots.push_back(next);
            history.gestures.push_back(gesture);
        }
        let last = history.snapshots.len() - 1;
        if index > last {
            return Err(HistoryError::IndexOutOfRange { index, last });
        }
        history.index = index;
        Ok(history)
    }

    /// Number of snapshots (gestures + 1).
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }

    pub fn gesture_count(&self) -> usize {
        self.gestures.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The visible snapshot.
    pub fn current(&self) -> &Store {
        &self.snapshots[self.index]
    }

    pub fn initial(&self) -> &Store {
        &self.snapshots[0]
    }

    fn last(&self) -> &Store {
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn snapshot(&self, index: usize) -> Option<&Store> {
        self.snapshots.get(index)
    }

    pub fn gesture(&self, index: usize) -> Option<&Gesture> {
        self.gestures.get(index)
    }

    pub fn gestures(&self) -> impl Iterator<Item = &Gesture> {
        self.gestures.iter()
    }

    /// What gesture `index` changed.
    pub fn gesture_patch(&self, index: usize) -> Option<Patch> {
        let before = self.snapshots.get(index)?;
        let after = self.snapshots.get(index + 1)?;
        Some(diff(before, after, None))
    }

    /// Append `gesture` and the snapshot it produced, discarding any redo tail.
    pub fn commit(&mut self, snapshot: Store, gesture: Gesture) {
        if self.can_redo() {
            log::debug!(
                target: "flowgrid::history",
                "discarding {} redo gesture(s)",
                self.gestures.len() - self.index
            );
            self.snapshots.truncate(self.index + 1);
            self.gestures.truncate(self.index);
        }
        self.snapshots.push_back(snapshot);
        self.gestures.push_back(gesture);
        self.index = self.snapshots.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    /// Step back one gesture. Returns false at the start.
    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.index -= 1;
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.index += 1;
        true
    }

    /// Jump to `index`, clamped to the valid range. Returns the new index.
    pub fn set_index(&mut self, index: usize) -> usize {
        let last = self.snapshots.len() - 1;
        if index > last {
            log::debug!(target: "flowgrid::history", "clamping history index {} to {}", index, last);
        }
        self.index = index.min(last);
        self.index
    }

    /// Drop the oldest gestures beyond `max_gestures` (0 = unlimited); the
    /// oldest retained snapshot becomes the new base. Returns how many went.
    pub fn compact(&mut self, max_gestures: usize) -> usize {
        if max_gestures == 0 || self.gestures.len() <= max_gestures {
            return 0;
        }
        let excess = self.gestures.len() - max_gestures;
        self.snapshots = self.snapshots.skip(excess);
        self.gestures = self.gestures.skip(excess);
        self.index = self.index.saturating_sub(excess);
        excess
    }
}

/// Apply every action of `gesture` to a copy of `base`. On failure, returns
/// the offending action's position.
pub fn apply_gesture(base: &Store, gesture: &Gesture) -> Result<Store, (usize, StoreError)> {
    let mut store = base.clone();
    let mut transient = store.begin_transient();
    for (position, moment) in gesture.actions.iter().enumerate() {
        reduce(&moment.action, &mut transient).map_err(|e| (position, e))?;
    }
    transient.commit();
    Ok(store)
}
