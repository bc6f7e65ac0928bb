use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use serde::Serialize;

/// Per-tick pipeline state.
///
/// `Idle -> Polling -> (Filtering -> Enriching -> Publishing) -> Idle`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleState {
    Idle = 0,
    Polling = 1,
    Filtering = 2,
    Enriching = 3,
    Publishing = 4,
}

impl From<u8> for CycleState {
    fn from(value: u8) -> Self {
        match value {
            1 => CycleState::Polling,
            2 => CycleState::Filtering,
            3 => CycleState::Enriching,
            4 => CycleState::Publishing,
            _ => CycleState::Idle,
        }
    }
}

/// "Tick in progress" flag shared by the tick timer and the cycle actor.
#[derive(Debug)]
pub struct CycleGuard {
    state: AtomicU8,
}

impl Default for CycleGuard {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(CycleState::Idle as u8),
        }
    }
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CycleState {
        CycleState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_idle(&self) -> bool {
        self.state() == CycleState::Idle
    }

    /// Claims the cycle (`Idle -> Polling`). `None` if a cycle is already running.
    pub fn try_begin(&self) -> Option<CycleToken<'_>> {
        self.state
            .compare_exchange(
                CycleState::Idle as u8,
                CycleState::Polling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| CycleToken { guard: self })
    }
}

/// Held for the duration of one tick. Dropping it, including when the tick
/// future is cancelled, returns the guard to `Idle`.
#[derive(Debug)]
pub struct CycleToken<'a> {
    guard: &'a CycleGuard,
}

impl CycleToken<'_> {
    pub fn enter(
        &self,
        state: CycleState,
    ) {
        self.guard.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for CycleToken<'_> {
    fn drop(&mut self) {
        self.guard.state.store(CycleState::Idle as u8, Ordering::Release);
    }
}
