//! The closed family of mutation requests and their timing envelopes.
//!
//! Every action knows its merge policy and whether it is saved. Only
//! [`Action::Store`] actions reach gesture history; [`Action::Ephemeral`]
//! applies the same mutations without leaving an undo trace, and
//! [`Action::History`] moves the history cursor.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::value::{Primitive, StoreValue};
use crate::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    NoMerge,
    /// Later action of the same kind replaces the earlier one.
    Merge,
    /// Like `Merge`, scoped to the target carried in the payload.
    SameIdMerge,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergeTarget {
    Path(Path),
    Element(Path, usize),
    Cell(Path, usize, usize),
}

/// Two adjacent pending actions combine only when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub kind: &'static str,
    pub target: Option<MergeTarget>,
}

/// Outcome of folding a later action into an earlier one.
#[derive(Debug, Clone, PartialEq)]
pub enum Merged {
    /// Both collapse into this single action.
    Replaced(StoreAction),
    /// The pair has no net effect.
    Cancelled,
    /// Keep both.
    Distinct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreAction {
    SetValue { path: Path, value: StoreValue },
    SetValues { values: Vec<(Path, StoreValue)> },
    ToggleValue { path: Path },
    SetVectorItem { path: Path, index: usize, value: Primitive },
    SetMatrixCell { path: Path, row: usize, col: usize, value: Primitive },
    PushVectorItem { path: Path, value: Primitive },
    InsertSetItem { path: Path, item: Primitive },
    EraseSetItem { path: Path, item: Primitive },
    Erase { path: Path },
    Clear { path: Path },
    ApplyPatch { patch: Patch },
}

impl StoreAction {
    pub fn set(path: Path, value: impl Into<StoreValue>) -> Self {
        StoreAction::SetValue {
            path,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreAction::SetValue { .. } => "SetValue",
            StoreAction::SetValues { .. } => "SetValues",
            StoreAction::ToggleValue { .. } => "ToggleValue",
            StoreAction::SetVectorItem { .. } => "SetVectorItem",
            StoreAction::SetMatrixCell { .. } => "SetMatrixCell",
            StoreAction::PushVectorItem { .. } => "PushVectorItem",
            StoreAction::InsertSetItem { .. } => "InsertSetItem",
            StoreAction::EraseSetItem { .. } => "EraseSetItem",
            StoreAction::Erase { .. } => "Erase",
            StoreAction::Clear { .. } => "Clear",
            StoreAction::ApplyPatch { .. } => "ApplyPatch",
        }
    }

    pub fn merge_policy(&self) -> MergePolicy {
        match self {
            StoreAction::SetValue { .. }
            | StoreAction::ToggleValue { .. }
            | StoreAction::SetVectorItem { .. }
            | StoreAction::SetMatrixCell { .. } => MergePolicy::SameIdMerge,
            StoreAction::SetValues { .. } => MergePolicy::Merge,
            StoreAction::PushVectorItem { .. }
            | StoreAction::InsertSetItem { .. }
            | StoreAction::EraseSetItem { .. }
            | StoreAction::Erase { .. }
            | StoreAction::Clear { .. }
            | StoreAction::ApplyPatch { .. } => MergePolicy::NoMerge,
        }
    }

    /// `None` for actions that never merge.
    pub fn merge_key(&self) -> Option<MergeKey> {
        let target = match self {
            StoreAction::SetValue { path, .. } | StoreAction::ToggleValue { path } => {
                Some(MergeTarget::Path(path.clone()))
            }
            StoreAction::SetVectorItem { path, index, .. } => {
                Some(MergeTarget::Element(path.clone(), *index))
            }
            StoreAction::SetMatrixCell { path, row, col, .. } => {
                Some(MergeTarget::Cell(path.clone(), *row, *col))
            }
            _ => None,
        };
        match self.merge_policy() {
            MergePolicy::NoMerge => None,
            MergePolicy::Merge => Some(MergeKey {
                kind: self.kind(),
                target: None,
            }),
            MergePolicy::SameIdMerge => Some(MergeKey {
                kind: self.kind(),
                target,
            }),
        }
    }

    /// Fold `later` into `self`. Applying the result must leave the store
    /// exactly as applying `self` then `later` would.
    pub fn merge(&self, later: &StoreAction) -> Merged {
        match (self.merge_key(), later.merge_key()) {
            (Some(earlier_key), Some(later_key)) if earlier_key == later_key => {}
            _ => return Merged::Distinct,
        }
        match (self, later) {
            (StoreAction::ToggleValue { .. }, StoreAction::ToggleValue { .. }) => Merged::Cancelled,
            (StoreAction::SetValues { values: earlier }, StoreAction::SetValues { values: newer }) => {
                let mut values: Vec<(Path, StoreValue)> = earlier
                    .iter()
                    .filter(|(path, _)| !newer.iter().any(|(p, _)| p == path))
                    .cloned()
                    .collect();
                values.extend(newer.iter().cloned());
                Merged::Replaced(StoreAction::SetValues { values })
            }
            _ => Merged::Replaced(later.clone()),
        }
    }

    /// Root of the entries this action writes, when there is a single one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreAction::SetValue { path, .. }
            | StoreAction::ToggleValue { path }
            | StoreAction::SetVectorItem { path, .. }
            | StoreAction::SetMatrixCell { path, .. }
            | StoreAction::PushVectorItem { path, .. }
            | StoreAction::InsertSetItem { path, .. }
            | StoreAction::EraseSetItem { path, .. }
            | StoreAction::Erase { path }
            | StoreAction::Clear { path } => Some(path),
            StoreAction::SetValues { .. } | StoreAction::ApplyPatch { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    Undo,
    Redo,
    SetHistoryIndex(usize),
    /// Close the pending gesture now instead of waiting for quiescence.
    CommitGesture,
}

impl HistoryAction {
    pub fn merge_policy(&self) -> MergePolicy {
        match self {
            HistoryAction::SetHistoryIndex(_) => MergePolicy::Merge,
            HistoryAction::Undo | HistoryAction::Redo | HistoryAction::CommitGesture => {
                MergePolicy::NoMerge
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Store(StoreAction),
    Ephemeral(StoreAction),
    History(HistoryAction),
}

impl Action {
    pub fn is_saved(&self) -> bool {
        matches!(self, Action::Store(_))
    }

    pub fn merge_policy(&self) -> MergePolicy {
        match self {
            Action::Store(action) | Action::Ephemeral(action) => action.merge_policy(),
            Action::History(action) => action.merge_policy(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Store(action) | Action::Ephemeral(action) => action.kind(),
            Action::History(HistoryAction::Undo) => "Undo",
            Action::History(HistoryAction::Redo) => "Redo",
            Action::History(HistoryAction::SetHistoryIndex(_)) => "SetHistoryIndex",
            Action::History(HistoryAction::CommitGesture) => "CommitGesture",
        }
    }
}

impl From<StoreAction> for Action {
    fn from(action: StoreAction) -> Self {
        Action::Store(action)
    }
}

impl From<HistoryAction> for Action {
    fn from(action: HistoryAction) -> Self {
        Action::History(action)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionMoment {
    pub action: Action,
    pub queue_time: Timestamp,
}

impl ActionMoment {
    pub fn new(action: Action, queue_time: Timestamp) -> Self {
        Self { action, queue_time }
    }

    pub fn now(action: impl Into<Action>) -> Self {
        Self::new(action.into(), Timestamp::now())
    }

    /// The gesture entry for this moment, if its action is saved.
    pub fn saved(&self) -> Option<SavedActionMoment> {
        match &self.action {
            Action::Store(action) => Some(SavedActionMoment {
                action: action.clone(),
                queue_time: self.queue_time,
            }),
            Action::Ephemeral(_) | Action::History(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SavedActionMoment {
    pub action: StoreAction,
    pub queue_time: Timestamp,
}

impl SavedActionMoment {
    pub fn new(action: StoreAction, queue_time: Timestamp) -> Self {
        Self { action, queue_time }
    }
}

/// One undo unit: the saved actions of a single interaction episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Gesture {
    pub actions: Vec<SavedActionMoment>,
    pub commit_time: Timestamp,
}

impl Gesture {
    pub fn new(actions: Vec<SavedActionMoment>, commit_time: Timestamp) -> Self {
        Self {
            actions,
            commit_time,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
