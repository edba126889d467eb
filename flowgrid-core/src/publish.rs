//! Read-only view of dispatcher state for other threads.
//!
//! The dispatcher owns the live store and history. After every transition it
//! publishes an immutable [`PublishedState`] through a lock-free triple
//! buffer: the writer fills the back slot and swaps it with the middle one,
//! the reader swaps the middle slot into the front when it wants fresh data.
//! Neither side ever blocks, and a reader never sees a half-written state.
//!
//! Snapshots are persistent, so publishing costs a few reference-count bumps.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use flowgrid_types::{SavedActionMoment, Store};

use crate::history::History;

/// What a UI thread needs to render store contents and the history list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedState {
    pub store: Store,
    pub history: History,
    /// Saved actions waiting for the current gesture to commit.
    pub pending_actions: Vec<SavedActionMoment>,
}

// State byte: [fresh:1][unused:1][back:2][middle:2][front:2]
const FRONT_SHIFT: u8 = 0;
const MIDDLE_SHIFT: u8 = 2;
const BACK_SHIFT: u8 = 4;
const SLOT_MASK: u8 = 0b11;
const FRESH: u8 = 0x80;
const INITIAL: u8 = (2 << BACK_SHIFT) | (1 << MIDDLE_SHIFT) | (0 << FRONT_SHIFT);

fn slot(state: u8, shift: u8) -> usize {
    ((state >> shift) & SLOT_MASK) as usize
}

fn encode(back: usize, middle: usize, front: usize) -> u8 {
    ((back as u8) << BACK_SHIFT) | ((middle as u8) << MIDDLE_SHIFT) | ((front as u8) << FRONT_SHIFT)
}

struct Slots {
    slots: [UnsafeCell<Arc<PublishedState>>; 3],
    state: AtomicU8,
}

// Safety: the state machine gives the writer exclusive use of the back slot
// and the reader exclusive use of the front slot; the middle slot is only
// touched through atomic index swaps.
unsafe impl Send for Slots {}
unsafe impl Sync for Slots {}

impl Slots {
    fn new(initial: Arc<PublishedState>) -> Self {
        Self {
            slots: [
                UnsafeCell::new(Arc::clone(&initial)),
                UnsafeCell::new(Arc::clone(&initial)),
                UnsafeCell::new(initial),
            ],
            state: AtomicU8::new(INITIAL),
        }
    }

    /// Writer: swap back and middle, raising the fresh bit.
    fn publish(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            let next = encode(
                slot(state, MIDDLE_SHIFT),
                slot(state, BACK_SHIFT),
                slot(state, FRONT_SHIFT),
            ) | FRESH;
            match self
                .state
                .compare_exchange_weak(state, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => state = current,
            }
        }
    }

    /// Reader: swap middle and front if the writer published since last time.
    fn consume(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & FRESH == 0 {
                return;
            }
            let next = encode(
                slot(state, BACK_SHIFT),
                slot(state, FRONT_SHIFT),
                slot(state, MIDDLE_SHIFT),
            );
            match self
                .state
                .compare_exchange_weak(state, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => state = current,
            }
        }
    }
}

/// Create a connected (publisher, reader) pair seeded with `initial`.
pub fn published_state(initial: PublishedState) -> (StatePublisher, StateReader) {
    let slots = Arc::new(Slots::new(Arc::new(initial)));
    (
        StatePublisher {
            slots: Arc::clone(&slots),
        },
        StateReader { slots },
    )
}

/// Writer half, held by the dispatcher.
pub struct StatePublisher {
    slots: Arc<Slots>,
}

impl StatePublisher {
    pub fn publish(&mut self, state: PublishedState) {
        let back = slot(self.slots.state.load(Ordering::Acquire), BACK_SHIFT);
        // Safety: only this (unique, non-Clone) writer touches the back slot.
        unsafe {
            *self.slots.slots[back].get() = Arc::new(state);
        }
        self.slots.publish();
    }
}

/// Reader half for one UI thread. Not `Clone`: the front slot has one owner.
pub struct StateReader {
    slots: Arc<Slots>,
}

impl StateReader {
    pub fn has_fresh(&self) -> bool {
        self.slots.state.load(Ordering::Acquire) & FRESH != 0
    }

    /// The most recently published state.
    pub fn latest(&mut self) -> Arc<PublishedState> {
        self.slots.consume();
        let front = slot(self.slots.state.load(Ordering::Acquire), FRONT_SHIFT);
        // Safety: `&mut self` on the only reader means nobody else reads the
        // front slot, and the writer never writes it.
        unsafe { Arc::clone(&*self.slots.slots[front].get()) }
    }
}
