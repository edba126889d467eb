#![allow(dead_code)]

use std::time::{Duration, Instant};

use flowgrid_core::config::DispatchConfig;
use flowgrid_core::Dispatcher;
use flowgrid_types::{Action, ActionMoment, HistoryAction, Path, StoreAction, Timestamp};

pub fn p(text: &str) -> Path {
    Path::parse(text).expect("test path")
}

pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        gesture_duration: Duration::from_millis(50),
        max_depth: 0,
    }
}

pub fn dispatcher() -> Dispatcher {
    Dispatcher::new(test_config())
}

pub fn saved_at(action: StoreAction, millis: u64) -> ActionMoment {
    ActionMoment::new(Action::Store(action), Timestamp(millis))
}

pub fn history_moment(action: HistoryAction) -> ActionMoment {
    ActionMoment::new(Action::History(action), Timestamp(0))
}

/// Apply `actions` as one gesture and commit it.
pub fn commit_gesture(dispatcher: &mut Dispatcher, actions: Vec<StoreAction>) {
    let now = Instant::now();
    let result = dispatcher.dispatch_batch(
        actions.into_iter().map(|a| saved_at(a, 0)),
        now,
    );
    assert!(result.is_ok(), "gesture rejected: {:?}", result.errors);
    dispatcher.flush();
}

pub fn set_volume(value: f32) -> StoreAction {
    StoreAction::set(p("/Volume"), value)
}
