//! # flowgrid-core
//!
//! The time-travelable application store engine: a concurrent action queue,
//! a single-threaded dispatcher that applies actions and groups saved ones into
//! undoable gestures, the gesture history, and the JSON project formats.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowgrid_core::config::Config;
//! use flowgrid_core::dispatch::Dispatcher;
//! use flowgrid_core::queue::ActionQueue;
//! use flowgrid_types::{Path, StoreAction};
//!
//! // 1. Build the queue and the applier from config
//! let config = Config::load();
//! let (producer, consumer) = ActionQueue::new(config.queue());
//! let mut dispatcher = Dispatcher::new(config.dispatch());
//!
//! // 2. Hand a reader to the UI thread, register listeners
//! let mut reader = dispatcher.state_reader();
//! let applier = dispatcher.spawn(consumer)?;
//!
//! // 3. Producers enqueue from any thread
//! producer.enqueue(StoreAction::set(Path::parse("/Audio/Volume")?, 0.7f32))?;
//!
//! // 4. The UI reads the latest published store and history
//! let state = reader.latest();
//!
//! // 5. Shutdown drains the queue and commits the last gesture
//! producer.shutdown();
//! let dispatcher = applier.join();
//! ```
//!
//! ## Module Overview
//!
//! - [`queue`]: `ActionQueue` producer/consumer halves over crossbeam channels
//! - [`dispatch`]: `Dispatcher`: live application, gesture commit, undo/redo
//! - [`merge`]: coalescing pending saved actions into undo-visible edits
//! - [`history`]: snapshots + gestures + cursor
//! - [`fields`]: field registry, typed fields, patch listeners
//! - [`publish`]: lock-free published state for reader threads
//! - [`project`]: state (`.fgs`) and action (`.fga`) JSON formats
//! - [`config`]: embedded defaults + user overrides

pub mod config;
pub mod dispatch;
pub mod fields;
pub mod history;
pub mod merge;
pub mod project;
pub mod publish;
pub mod queue;

pub use dispatch::{DispatchError, DispatchResult, Dispatcher};
pub use history::History;

// Re-export the data model so most callers need a single dependency.
pub use flowgrid_types as types;
