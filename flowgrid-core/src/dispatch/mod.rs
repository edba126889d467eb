//! The single-threaded applier and its gesture commit protocol.
//!
//! Actions are applied as they are drained, one transient view per run of
//! consecutive actions of the same family, and the resulting patch goes to
//! every listener. Saved actions write the saved store (the current snapshot
//! plus the pending gesture); ephemeral actions write an overlay on top of
//! it, which never reaches history. The live store is the saved store with
//! the overlay applied. Saved moments accumulate in the pending gesture,
//! which commits to history when:
//! - no saved action arrived for the configured quiescence window and no
//!   widget holds the gesture open (`tick`)
//! - a history action or `CommitGesture` forces it
//! - the dispatcher is flushed or shut down

mod ephemeral;
mod gesture;

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;

use flowgrid_types::{
    diff, reduce, Action, ActionMoment, Gesture, HistoryAction, Patch, Path, SavedActionMoment,
    Store, StoreError, Timestamp,
};

use crate::config::DispatchConfig;
use crate::fields::PatchListener;
use crate::history::{apply_gesture, History};
use crate::merge::merge_actions;
use crate::project::Project;
use crate::publish::{published_state, PublishedState, StatePublisher, StateReader};
use crate::queue::{ActionConsumer, Dequeued};

use ephemeral::EphemeralOverlay;
use gesture::PendingGesture;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("{kind} action rejected: {source}")]
    Action {
        kind: &'static str,
        #[source]
        source: StoreError,
    },
}

/// What one dispatch call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResult {
    /// Store and ephemeral actions applied.
    pub applied: usize,
    /// Gestures committed to history.
    pub committed: usize,
    /// Actions rejected; none of them changed any state.
    pub errors: Vec<DispatchError>,
}

impl DispatchResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Dispatcher {
    store: Store,
    saved: Store,
    ephemeral: EphemeralOverlay,
    history: History,
    pending: PendingGesture,
    config: DispatchConfig,
    widget_gesturing: bool,
    listeners: Vec<Box<dyn PatchListener + Send>>,
    publisher: Option<StatePublisher>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self::with_history(config, History::default())
    }

    /// Start from an existing history; the live store is its current snapshot.
    pub fn with_history(config: DispatchConfig, history: History) -> Self {
        Self {
            store: history.current().clone(),
            saved: history.current().clone(),
            ephemeral: EphemeralOverlay::default(),
            history,
            pending: PendingGesture::default(),
            config,
            widget_gesturing: false,
            listeners: Vec::new(),
            publisher: None,
        }
    }

    /// The live store, including uncommitted and ephemeral writes.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The store without ephemeral writes: the visible snapshot plus the
    /// pending gesture.
    pub fn saved_store(&self) -> &Store {
        &self.saved
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Saved moments of the gesture in progress, unmerged.
    pub fn pending(&self) -> &[SavedActionMoment] {
        self.pending.moments()
    }

    /// When the pending gesture commits if nothing else arrives.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.deadline()
    }

    pub fn add_listener(&mut self, listener: impl PatchListener + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Start publishing read-only state for one reader thread.
    pub fn state_reader(&mut self) -> StateReader {
        let (publisher, reader) = published_state(self.published());
        self.publisher = Some(publisher);
        reader
    }

    /// While set, quiescence does not commit the pending gesture.
    pub fn set_widget_gesturing(&mut self, gesturing: bool) {
        self.widget_gesturing = gesturing;
    }

    pub fn dispatch(&mut self, moment: ActionMoment, now: Instant) -> DispatchResult {
        self.dispatch_batch(std::iter::once(moment), now)
    }

    /// Apply `moments` in order. Consecutive actions of one family (saved
    /// or ephemeral) share one transient view and one patch.
    pub fn dispatch_batch(
        &mut self,
        moments: impl IntoIterator<Item = ActionMoment>,
        now: Instant,
    ) -> DispatchResult {
        let mut result = DispatchResult::none();
        let mut run: Vec<ActionMoment> = Vec::new();
        for moment in moments {
            if let Action::History(action) = moment.action {
                self.apply_run(std::mem::take(&mut run), now, &mut result);
                self.apply_history(action, &mut result);
                continue;
            }
            let switches = run
                .first()
                .is_some_and(|first| first.action.is_saved() != moment.action.is_saved());
            if switches {
                self.apply_run(std::mem::take(&mut run), now, &mut result);
            }
            run.push(moment);
        }
        self.apply_run(run, now, &mut result);
        result
    }

    /// Commit the pending gesture if its quiescence deadline has passed.
    pub fn tick(&mut self, now: Instant) -> DispatchResult {
        let mut result = DispatchResult::none();
        if self.widget_gesturing || !self.pending.is_due(now) {
            return result;
        }
        if self.commit_pending() {
            result.committed += 1;
        }
        self.publish();
        result
    }

    /// Commit the pending gesture now, whatever the deadline or widget hold.
    pub fn flush(&mut self) -> DispatchResult {
        let mut result = DispatchResult::none();
        if self.commit_pending() {
            result.committed += 1;
            self.publish();
        }
        result
    }

    /// Replace store and history with a decoded project. The pending gesture
    /// belonged to the previous project and is dropped.
    pub fn open_project(&mut self, project: Project) {
        let dropped = self.pending.take();
        if !dropped.is_empty() {
            log::warn!(target: "flowgrid::dispatch", "discarding {} uncommitted action(s) on project open", dropped.len());
        }
        self.history = project.into_history();
        log::info!(
            target: "flowgrid::dispatch",
            "opened project: {} gesture(s), index {}",
            self.history.gesture_count(),
            self.history.index()
        );
        self.show_current();
    }

    /// Blocking applier loop. Returns once the queue shuts down, after
    /// draining it and committing whatever is pending.
    pub fn run(mut self, consumer: ActionConsumer) -> Self {
        log::debug!(target: "flowgrid::dispatch", "applier started");
        loop {
            self.set_widget_gesturing(consumer.is_gesturing());
            let timeout = match self.pending.deadline() {
                Some(deadline) if !self.widget_gesturing => {
                    deadline.saturating_duration_since(Instant::now())
                }
                _ => self.config.gesture_duration,
            };
            match consumer.dequeue_timeout(timeout) {
                Dequeued::Moment(first) => {
                    let mut batch = vec![first];
                    batch.extend(consumer.drain());
                    self.dispatch_batch(batch, Instant::now());
                }
                Dequeued::Timeout => {}
                Dequeued::Shutdown => break,
            }
            self.set_widget_gesturing(consumer.is_gesturing());
            self.tick(Instant::now());
        }

        let remaining = consumer.drain_remaining();
        if !remaining.is_empty() {
            self.dispatch_batch(remaining, Instant::now());
        }
        self.flush();
        log::debug!(target: "flowgrid::dispatch", "applier stopped at history index {}", self.history.index());
        self
    }

    /// Run the applier on its own thread. Join the handle to get the
    /// dispatcher back after shutdown.
    pub fn spawn(self, consumer: ActionConsumer) -> io::Result<JoinHandle<Dispatcher>> {
        thread::Builder::new()
            .name("flowgrid-applier".into())
            .spawn(move || self.run(consumer))
    }

    fn apply_run(&mut self, run: Vec<ActionMoment>, now: Instant, result: &mut DispatchResult) {
        let saved = match run.first() {
            Some(first) => first.action.is_saved(),
            None => return,
        };
        let patch = if saved {
            self.apply_saved(&run, now, result)
        } else {
            self.apply_ephemeral(&run, result)
        };
        self.notify(&patch);
        self.publish();
    }

    /// Saved actions see only saved state. What they change is copied onto
    /// the live store and takes back any ephemeral value at those paths.
    fn apply_saved(
        &mut self,
        run: &[ActionMoment],
        now: Instant,
        result: &mut DispatchResult,
    ) -> Patch {
        let mut moments = Vec::new();
        let mut transient = self.saved.begin_transient();
        for moment in run {
            let Action::Store(action) = &moment.action else {
                continue;
            };
            match reduce(action, &mut transient) {
                Ok(()) => {
                    result.applied += 1;
                    moments.extend(moment.saved());
                }
                Err(source) => reject(action.kind(), source, result),
            }
        }
        let written = transient.commit();

        let mut touched: Vec<Path> = written.paths().cloned().collect();
        touched.extend(self.ephemeral.release(&written, moments.iter().map(|m| &m.action)));
        let mut live = self.store.begin_transient();
        for path in touched {
            match self.saved.try_get(&path) {
                Some(value) => live.set(path, value.clone()),
                None => {
                    live.erase(&path);
                }
            }
        }
        let patch = live.commit();

        let deadline = now + self.config.gesture_duration;
        for moment in moments {
            self.pending.push(moment, deadline);
        }
        patch
    }

    fn apply_ephemeral(&mut self, run: &[ActionMoment], result: &mut DispatchResult) -> Patch {
        let mut transient = self.store.begin_transient();
        for moment in run {
            let Action::Ephemeral(action) = &moment.action else {
                continue;
            };
            match reduce(action, &mut transient) {
                Ok(()) => result.applied += 1,
                Err(source) => reject(action.kind(), source, result),
            }
        }
        let patch = transient.commit();
        self.ephemeral.record(&patch);
        patch
    }

    fn apply_history(&mut self, action: HistoryAction, result: &mut DispatchResult) {
        if self.commit_pending() {
            result.committed += 1;
        }
        let moved = match action {
            HistoryAction::Undo => self.history.undo(),
            HistoryAction::Redo => self.history.redo(),
            HistoryAction::SetHistoryIndex(index) => {
                let before = self.history.index();
                self.history.set_index(index) != before
            }
            HistoryAction::CommitGesture => false,
        };
        if moved {
            log::debug!(target: "flowgrid::dispatch", "history index now {}", self.history.index());
            self.show_current();
        } else {
            self.publish();
        }
    }

    /// Record the pending gesture. Returns false when there was nothing to
    /// commit or its actions cancelled out.
    fn commit_pending(&mut self) -> bool {
        let moments = self.pending.take();
        if moments.is_empty() {
            return false;
        }
        let merged = merge_actions(&moments);
        if merged.is_empty() {
            log::debug!(target: "flowgrid::dispatch", "{} pending action(s) cancelled out", moments.len());
            return false;
        }
        log::debug!(
            target: "flowgrid::dispatch",
            "committing gesture: {} action(s) merged to {}",
            moments.len(),
            merged.len()
        );
        let gesture = Gesture::new(merged, Timestamp::now());
        // The snapshot is the gesture replayed on the visible one, never the
        // live store, so ephemeral values stay out of history.
        let snapshot = match apply_gesture(self.history.current(), &gesture) {
            Ok(snapshot) => snapshot,
            Err((position, source)) => {
                log::error!(
                    target: "flowgrid::dispatch",
                    "merged gesture does not replay at action {}: {}; recording the saved store",
                    position,
                    source
                );
                self.saved.clone()
            }
        };
        self.saved = snapshot.clone();
        self.history.commit(snapshot, gesture);
        let dropped = self.history.compact(self.config.max_depth);
        if dropped > 0 {
            log::debug!(target: "flowgrid::dispatch", "compacted {} oldest gesture(s)", dropped);
        }
        true
    }

    /// Make the history's visible snapshot live and broadcast the difference.
    fn show_current(&mut self) {
        self.saved = self.history.current().clone();
        let next = self.ephemeral.apply(&self.saved);
        let previous = std::mem::replace(&mut self.store, next);
        let patch = diff(&previous, &self.store, None);
        self.notify(&patch);
        self.publish();
    }

    fn notify(&mut self, patch: &Patch) {
        if patch.is_empty() {
            return;
        }
        for listener in self.listeners.iter_mut() {
            listener.on_patch(patch, &self.store);
        }
    }

    fn published(&self) -> PublishedState {
        PublishedState {
            store: self.store.clone(),
            history: self.history.clone(),
            pending_actions: self.pending.moments().to_vec(),
        }
    }

    fn publish(&mut self) {
        if self.publisher.is_none() {
            return;
        }
        let state = self.published();
        if let Some(publisher) = self.publisher.as_mut() {
            publisher.publish(state);
        }
    }
}

fn reject(kind: &'static str, source: StoreError, result: &mut DispatchResult) {
    log::error!(target: "flowgrid::dispatch", "{} action failed: {}", kind, source);
    result.errors.push(DispatchError::Action { kind, source });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use flowgrid_types::{Path, StoreAction, StoreValue};

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            gesture_duration: Duration::from_millis(100),
            max_depth: 0,
        }
    }

    fn saved(path: &str, value: f32) -> ActionMoment {
        ActionMoment::new(Action::Store(StoreAction::set(p(path), value)), Timestamp(0))
    }

    fn history(action: HistoryAction) -> ActionMoment {
        ActionMoment::new(Action::History(action), Timestamp(0))
    }

    #[derive(Default)]
    struct Recorder {
        patches: Vec<Patch>,
    }

    impl PatchListener for Recorder {
        fn on_patch(&mut self, patch: &Patch, _store: &Store) {
            self.patches.push(patch.clone());
        }
    }

    #[test]
    fn test_saved_actions_apply_live_and_commit_on_quiescence() {
        let mut dispatcher = Dispatcher::new(config());
        let start = Instant::now();
        dispatcher.dispatch(saved("/Volume", 0.5), start);
        assert_eq!(dispatcher.store().get_as::<f32>(&p("/Volume")), Ok(0.5));
        assert_eq!(dispatcher.history().gesture_count(), 0);

        assert_eq!(dispatcher.tick(start + Duration::from_millis(50)).committed, 0);
        assert_eq!(dispatcher.tick(start + Duration::from_millis(100)).committed, 1);
        assert_eq!(dispatcher.history().gesture_count(), 1);
        assert!(dispatcher.pending().is_empty());
    }

    #[test]
    fn test_each_saved_action_resets_deadline() {
        let mut dispatcher = Dispatcher::new(config());
        let start = Instant::now();
        dispatcher.dispatch(saved("/Volume", 0.5), start);
        dispatcher.dispatch(saved("/Volume", 0.6), start + Duration::from_millis(80));
        assert_eq!(dispatcher.tick(start + Duration::from_millis(120)).committed, 0);
        assert_eq!(dispatcher.tick(start + Duration::from_millis(180)).committed, 1);
        assert_eq!(dispatcher.history().gesture(0).map(Gesture::len), Some(1));
    }

    #[test]
    fn test_widget_hold_blocks_quiescence_but_not_flush() {
        let mut dispatcher = Dispatcher::new(config());
        let start = Instant::now();
        dispatcher.set_widget_gesturing(true);
        dispatcher.dispatch(saved("/Volume", 0.5), start);
        assert_eq!(dispatcher.tick(start + Duration::from_secs(5)).committed, 0);
        assert_eq!(dispatcher.flush().committed, 1);
    }

    #[test]
    fn test_ephemeral_actions_leave_no_gesture() {
        let mut dispatcher = Dispatcher::new(config());
        let moment = ActionMoment::new(
            Action::Ephemeral(StoreAction::set(p("/Hover"), true)),
            Timestamp(0),
        );
        let result = dispatcher.dispatch(moment, Instant::now());
        assert_eq!(result.applied, 1);
        assert!(dispatcher.pending().is_empty());
        assert_eq!(dispatcher.flush().committed, 0);
        assert_eq!(dispatcher.store().get_as::<bool>(&p("/Hover")), Ok(true));
    }

    fn ephemeral(path: &str, value: impl Into<StoreValue>) -> ActionMoment {
        ActionMoment::new(Action::Ephemeral(StoreAction::set(p(path), value)), Timestamp(0))
    }

    #[test]
    fn test_ephemeral_values_stay_out_of_snapshots() {
        let mut dispatcher = Dispatcher::new(config());
        let now = Instant::now();
        dispatcher.dispatch_batch(vec![ephemeral("/Hover", true), saved("/Volume", 0.5)], now);
        assert_eq!(dispatcher.flush().committed, 1);

        let recorded = dispatcher.history();
        let snapshot = recorded.current();
        assert!(!snapshot.count(&p("/Hover")));
        assert_eq!(
            apply_gesture(recorded.initial(), recorded.gesture(0).unwrap()).as_ref(),
            Ok(snapshot)
        );
        assert_eq!(dispatcher.saved_store(), snapshot);
        assert_eq!(dispatcher.store().get_as::<bool>(&p("/Hover")), Ok(true));

        dispatcher.dispatch(history(HistoryAction::Undo), now);
        assert_eq!(dispatcher.store().get_as::<bool>(&p("/Hover")), Ok(true));
        assert!(!dispatcher.store().count(&p("/Volume")));

        let json = crate::project::encode_actions(dispatcher.history()).unwrap();
        let decoded = crate::project::decode(&json, crate::project::ProjectFormat::Action).unwrap();
        assert_eq!(decoded.into_history().current(), dispatcher.saved_store());
    }

    #[test]
    fn test_saved_actions_do_not_see_ephemeral_paths() {
        let mut dispatcher = Dispatcher::new(config());
        let now = Instant::now();
        dispatcher.dispatch(ephemeral("/Hover", true), now);
        let toggle = ActionMoment::new(
            Action::Store(StoreAction::ToggleValue { path: p("/Hover") }),
            Timestamp(0),
        );
        let result = dispatcher.dispatch(toggle, now);
        assert!(matches!(
            result.errors.as_slice(),
            [DispatchError::Action { kind: "ToggleValue", source: StoreError::PathNotFound(_) }]
        ));
        assert!(dispatcher.pending().is_empty());
        assert_eq!(dispatcher.store().get_as::<bool>(&p("/Hover")), Ok(true));
    }

    #[test]
    fn test_saved_write_takes_over_ephemeral_value() {
        let mut dispatcher = Dispatcher::new(config());
        let now = Instant::now();
        dispatcher.dispatch(ephemeral("/Volume", 0.9f32), now);
        dispatcher.dispatch(saved("/Volume", 0.5), now);
        assert_eq!(dispatcher.store().get_as::<f32>(&p("/Volume")), Ok(0.5));
        dispatcher.flush();

        dispatcher.dispatch(history(HistoryAction::Undo), now);
        assert!(!dispatcher.store().count(&p("/Volume")));
        dispatcher.dispatch(history(HistoryAction::Redo), now);
        assert_eq!(dispatcher.store().get_as::<f32>(&p("/Volume")), Ok(0.5));
    }

    #[test]
    fn test_failed_action_is_reported_and_harmless() {
        let mut dispatcher = Dispatcher::new(config());
        let now = Instant::now();
        let toggle = ActionMoment::new(
            Action::Store(StoreAction::ToggleValue { path: p("/Missing") }),
            Timestamp(0),
        );
        let result = dispatcher.dispatch_batch(vec![saved("/Volume", 0.5), toggle], now);
        assert_eq!(result.applied, 1);
        assert!(matches!(
            result.errors.as_slice(),
            [DispatchError::Action { kind: "ToggleValue", source: StoreError::PathNotFound(_) }]
        ));
        assert_eq!(dispatcher.pending().len(), 1);
    }

    #[test]
    fn test_history_action_forces_commit_then_moves() {
        let mut dispatcher = Dispatcher::new(config());
        let now = Instant::now();
        let result = dispatcher.dispatch_batch(
            vec![saved("/Volume", 0.5), history(HistoryAction::Undo)],
            now,
        );
        assert_eq!(result.committed, 1);
        assert_eq!(dispatcher.history().index(), 0);
        assert!(!dispatcher.store().count(&p("/Volume")));

        dispatcher.dispatch(history(HistoryAction::Redo), now);
        assert_eq!(dispatcher.store().get_as::<f32>(&p("/Volume")), Ok(0.5));
    }

    #[test]
    fn test_listeners_get_batch_and_undo_patches() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let mut dispatcher = Dispatcher::new(config());
        dispatcher.add_listener(Arc::clone(&recorder));
        let now = Instant::now();

        dispatcher.dispatch_batch(vec![saved("/a", 1.0), saved("/b", 2.0)], now);
        dispatcher.dispatch(history(HistoryAction::Undo), now);
        // Nothing left to undo: no patch.
        dispatcher.dispatch(history(HistoryAction::Undo), now);

        let recorded = recorder.lock().unwrap();
        let patches = &recorded.patches;
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].len(), 2);
        assert_eq!(patches[1], patches[0].invert());
    }

    #[test]
    fn test_toggle_pair_commits_nothing() {
        let mut dispatcher = Dispatcher::with_history(
            config(),
            History::new([(p("/Muted"), StoreValue::Bool(false))].into_iter().collect()),
        );
        let toggle = ActionMoment::new(
            Action::Store(StoreAction::ToggleValue { path: p("/Muted") }),
            Timestamp(0),
        );
        dispatcher.dispatch_batch(vec![toggle.clone(), toggle], Instant::now());
        assert_eq!(dispatcher.flush().committed, 0);
        assert_eq!(dispatcher.history().gesture_count(), 0);
    }

    #[test]
    fn test_max_depth_compacts() {
        let mut dispatcher = Dispatcher::new(DispatchConfig {
            max_depth: 2,
            ..config()
        });
        let now = Instant::now();
        for v in 0..4 {
            dispatcher.dispatch(saved("/Volume", v as f32), now);
            dispatcher.flush();
        }
        assert_eq!(dispatcher.history().gesture_count(), 2);
        assert_eq!(dispatcher.history().initial().get_as::<f32>(&p("/Volume")), Ok(1.0));
    }

    #[test]
    fn test_reader_sees_published_state() {
        let mut dispatcher = Dispatcher::new(config());
        let mut reader = dispatcher.state_reader();
        dispatcher.dispatch(saved("/Volume", 0.5), Instant::now());
        let state = reader.latest();
        assert_eq!(state.pending_actions.len(), 1);
        assert_eq!(state.store.get_as::<f32>(&p("/Volume")), Ok(0.5));
        dispatcher.flush();
        assert_eq!(reader.latest().history.gesture_count(), 1);
    }
}
