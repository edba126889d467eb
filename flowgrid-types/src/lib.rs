//! # flowgrid-types
//!
//! Data model for the flowgrid application store: paths, tagged values,
//! persistent snapshots and their patches, and the action family that mutates
//! them. The engine lives in `flowgrid-core`.

pub mod action;
mod error;
mod patch;
mod path;
pub mod reduce;
mod store;
mod value;

pub use action::*;
pub use error::{PathError, StoreError};
pub use patch::{diff, Patch, PatchOp};
pub use path::Path;
pub use reduce::reduce;
pub use store::{Store, TransientStore};
pub use value::{EnumIndex, FromStoreValue, Matrix, Primitive, StoreValue};

// Containers used inside `StoreValue`, re-exported so callers need not pin `im`.
pub use im::{OrdSet, Vector};

/// Identifier handed out by the field registry, one per registered field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct FieldId(u32);

impl FieldId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
