//! Pure store-mutation reducer.
//!
//! `reduce` is the single place where a [`StoreAction`] turns into writes on a
//! [`TransientStore`]. Both live dispatch and history replay call it.
//!
//! Reducers are pure: they touch the transient view only. They do NOT:
//! - Record gestures or move the history cursor
//! - Compute or broadcast patches
//! - Log
//!
//! Each action validates everything it reads before writing, so a failing
//! action leaves the transient view exactly as it found it.

use im::{OrdSet, Vector};

use crate::action::StoreAction;
use crate::error::StoreError;
use crate::store::TransientStore;
use crate::value::{Matrix, Primitive, StoreValue};

pub fn reduce(action: &StoreAction, store: &mut TransientStore<'_>) -> Result<(), StoreError> {
    match action {
        StoreAction::SetValue { path, value } => {
            store.set(path.clone(), value.clone());
        }
        StoreAction::SetValues { values } => {
            for (path, value) in values {
                store.set(path.clone(), value.clone());
            }
        }
        StoreAction::ToggleValue { path } => {
            let current: bool = store.get_as(path)?;
            store.set(path.clone(), !current);
        }
        StoreAction::SetVectorItem { path, index, value } => {
            let mut items: Vector<Primitive> = store.get_as(path)?;
            if *index >= items.len() {
                return Err(StoreError::IndexOutOfRange {
                    path: path.clone(),
                    index: *index,
                    len: items.len(),
                });
            }
            items.set(*index, value.clone());
            store.set(path.clone(), StoreValue::Vector(items));
        }
        StoreAction::SetMatrixCell { path, row, col, value } => {
            let mut matrix: Matrix = store.get_as(path)?;
            let Some(index) = matrix.index_of(*row, *col) else {
                return Err(StoreError::IndexOutOfRange {
                    path: path.clone(),
                    index: row * matrix.col_count() + col,
                    len: matrix.data.len(),
                });
            };
            matrix.data.set(index, value.clone());
            store.set(path.clone(), StoreValue::Matrix(matrix));
        }
        StoreAction::PushVectorItem { path, value } => {
            let mut items: Vector<Primitive> = store.get_as(path)?;
            items.push_back(value.clone());
            store.set(path.clone(), StoreValue::Vector(items));
        }
        StoreAction::InsertSetItem { path, item } => {
            let mut items: OrdSet<Primitive> = store.get_as(path)?;
            items.insert(item.clone());
            store.set(path.clone(), StoreValue::Set(items));
        }
        StoreAction::EraseSetItem { path, item } => {
            let mut items: OrdSet<Primitive> = store.get_as(path)?;
            items.remove(item);
            store.set(path.clone(), StoreValue::Set(items));
        }
        StoreAction::Erase { path } => {
            store.erase(path);
        }
        StoreAction::Clear { path } => {
            store.clear(path);
        }
        StoreAction::ApplyPatch { patch } => {
            for (path, op) in patch.iter() {
                match op.new_value() {
                    Some(value) => store.set(path.clone(), value.clone()),
                    None => {
                        store.erase(path);
                    }
                }
            }
        }
    }
    Ok(())
}
