//! Coalescing of pending saved actions into undo-visible edits.
//!
//! Only the immediately preceding retained action is a merge candidate. A
//! merged entry keeps the earlier queue time, so replay timing reflects when
//! the gesture began.

use flowgrid_types::{Merged, SavedActionMoment};

/// Fold `moment` into the tail of `merged`.
pub fn push_merged(merged: &mut Vec<SavedActionMoment>, moment: SavedActionMoment) {
    let outcome = match merged.last() {
        Some(previous) => previous.action.merge(&moment.action),
        None => Merged::Distinct,
    };
    match outcome {
        Merged::Distinct => merged.push(moment),
        Merged::Replaced(action) => {
            if let Some(previous) = merged.last_mut() {
                previous.action = action;
            }
        }
        Merged::Cancelled => {
            merged.pop();
        }
    }
}

/// Merge a pending batch in queue order. Stable under repetition.
pub fn merge_actions(moments: &[SavedActionMoment]) -> Vec<SavedActionMoment> {
    let mut merged = Vec::with_capacity(moments.len());
    for moment in moments {
        push_merged(&mut merged, moment.clone());
    }
    merged
}
