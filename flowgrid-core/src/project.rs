//! JSON project formats.
//!
//! Two interchangeable encodings of a project:
//! - **State** (`.fgs`): the visible store snapshot, keyed by path text
//! - **Action** (`.fga`): the gesture history with its cursor, replayable
//!   from the base snapshot (empty unless the history was compacted)
//!
//! Decoding never touches live state; the caller hands the result to
//! [`crate::Dispatcher::open_project`] only on success.

use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowgrid_types::{diff, Gesture, SavedActionMoment, Store, StoreAction, Timestamp};

use crate::history::{History, HistoryError};

pub const STATE_EXTENSION: &str = "fgs";
pub const ACTION_EXTENSION: &str = "fga";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to open project: malformed state: {0}")]
    MalformedState(#[source] serde_json::Error),
    #[error("failed to open project: malformed action history: {0}")]
    MalformedActions(#[source] serde_json::Error),
    #[error("failed to open project: replay failed at {0}")]
    Replay(#[source] HistoryError),
    #[error("failed to open project: index {index} past the last snapshot ({last})")]
    IndexOutOfRange { index: usize, last: usize },
    #[error("unknown project file type {0:?}")]
    UnknownFormat(String),
    #[error("failed to encode project: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFormat {
    State,
    Action,
}

impl ProjectFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &FsPath) -> Result<Self, ProjectError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(STATE_EXTENSION) => Ok(ProjectFormat::State),
            Some(ACTION_EXTENSION) => Ok(ProjectFormat::Action),
            _ => Err(ProjectError::UnknownFormat(path.display().to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ProjectFormat::State => STATE_EXTENSION,
            ProjectFormat::Action => ACTION_EXTENSION,
        }
    }
}

/// A decoded project.
#[derive(Debug, Clone, PartialEq)]
pub enum Project {
    State(Store),
    Actions(History),
}

impl Project {
    pub fn format(&self) -> ProjectFormat {
        match self {
            Project::State(_) => ProjectFormat::State,
            Project::Actions(_) => ProjectFormat::Action,
        }
    }

    /// The snapshot the project opens at.
    pub fn store(&self) -> &Store {
        match self {
            Project::State(store) => store,
            Project::Actions(history) => history.current(),
        }
    }

    /// History to install when opening. A state project starts a fresh
    /// history based on its snapshot.
    pub fn into_history(self) -> History {
        match self {
            Project::State(store) => History::new(store),
            Project::Actions(history) => history,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ActionProject {
    #[serde(default, skip_serializing_if = "Store::is_empty")]
    initial_state: Store,
    gestures: Vec<Gesture>,
    index: usize,
}

pub fn encode_state(store: &Store) -> Result<String, ProjectError> {
    serde_json::to_string_pretty(store).map_err(ProjectError::Encode)
}

pub fn encode_actions(history: &History) -> Result<String, ProjectError> {
    let project = ActionProject {
        initial_state: history.initial().clone(),
        gestures: history.gestures().cloned().collect(),
        index: history.index(),
    };
    serde_json::to_string_pretty(&project).map_err(ProjectError::Encode)
}

pub fn encode(project: &Project) -> Result<String, ProjectError> {
    match project {
        Project::State(store) => encode_state(store),
        Project::Actions(history) => encode_actions(history),
    }
}

pub fn decode(json: &str, format: ProjectFormat) -> Result<Project, ProjectError> {
    match format {
        ProjectFormat::State => {
            let store: Store = serde_json::from_str(json).map_err(ProjectError::MalformedState)?;
            Ok(Project::State(store))
        }
        ProjectFormat::Action => {
            let project: ActionProject =
                serde_json::from_str(json).map_err(ProjectError::MalformedActions)?;
            let history = History::replay(project.initial_state, project.gestures, project.index)
                .map_err(|e| match e {
                    HistoryError::IndexOutOfRange { index, last } => {
                        ProjectError::IndexOutOfRange { index, last }
                    }
                    other => ProjectError::Replay(other),
                })?;
            log::debug!(
                target: "flowgrid::project",
                "replayed {} gesture(s), index {}",
                history.gesture_count(),
                history.index()
            );
            Ok(Project::Actions(history))
        }
    }
}

/// A one-gesture history reaching `store` from the empty state.
pub fn state_as_history(store: &Store, commit_time: Timestamp) -> History {
    let patch = diff(&Store::default(), store, None);
    if patch.is_empty() {
        return History::default();
    }
    let gesture = Gesture::new(
        vec![SavedActionMoment::new(StoreAction::ApplyPatch { patch }, commit_time)],
        commit_time,
    );
    let mut history = History::default();
    history.commit(store.clone(), gesture);
    history
}
