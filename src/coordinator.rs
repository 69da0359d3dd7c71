// src/coordinator.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run coordinator: a reusable rendezvous sized to the worker count
//!
//! Every worker calls [`RunCoordinator::wait`] twice, once when its setup is
//! done and once after it merged its tally. Nobody passes a phase until all
//! participants arrived. [`RunCoordinator::abort`] releases the waiters if a
//! worker can never arrive (spawn failure or a panic), so the run fails instead
//! of hanging.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{BenchError, Result};

#[derive(Debug)]
struct Rendezvous {
    arrived: usize,
    generation: u64,
    aborted: Option<String>,
}

/// Barrier plus the run's measurement window
#[derive(Debug)]
pub struct RunCoordinator {
    participants: usize,
    duration: Duration,
    state: Mutex<Rendezvous>,
    released: Condvar,
}

impl RunCoordinator {
    /// Coordinator for exactly `participants` workers
    pub fn new(participants: usize, duration: Duration) -> Self {
        Self {
            participants,
            duration,
            state: Mutex::new(Rendezvous {
                arrived: 0,
                generation: 0,
                aborted: None,
            }),
            released: Condvar::new(),
        }
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn state(&self) -> MutexGuard<'_, Rendezvous> {
        // Only counters live behind this lock, a poisoned guard is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until all participants have called `wait` for the current phase.
    ///
    /// Returns `Ok(true)` for exactly one caller per phase (the leader, the last
    /// to arrive). Fails with `RunAborted` once the run has been aborted.
    pub fn wait(&self) -> Result<bool> {
        let mut state = self.state();
        if let Some(reason) = &state.aborted {
            return Err(BenchError::RunAborted(reason.clone()));
        }

        state.arrived += 1;
        if state.arrived >= self.participants {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return Ok(true);
        }

        let generation = state.generation;
        let state = self
            .released
            .wait_while(state, |s| s.generation == generation && s.aborted.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        match (&state.aborted, state.generation == generation) {
            (Some(reason), true) => Err(BenchError::RunAborted(reason.clone())),
            _ => Ok(false),
        }
    }

    /// Release every current and future waiter with `RunAborted`
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state();
        if state.aborted.is_none() {
            tracing::warn!("Aborting run: {}", reason);
            state.aborted = Some(reason);
        }
        self.released.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state().aborted.is_some()
    }

    /// Open the measurement window now
    pub fn open_window(&self) -> MeasurementWindow {
        MeasurementWindow::starting_at(Instant::now(), self.duration)
    }
}

/// Fixed measurement window `[start, start + duration)`
#[derive(Debug, Clone, Copy)]
pub struct MeasurementWindow {
    start: Instant,
    deadline: Instant,
}

impl MeasurementWindow {
    pub fn starting_at(start: Instant, duration: Duration) -> Self {
        Self {
            start,
            deadline: start + duration,
        }
    }

    /// True until the deadline has passed
    #[inline]
    pub fn is_open(&self) -> bool {
        Instant::now() < self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Aborts the coordinator if the owning thread unwinds
pub struct AbortOnPanic<'a> {
    coordinator: &'a RunCoordinator,
    worker_id: usize,
}

impl<'a> AbortOnPanic<'a> {
    pub fn new(coordinator: &'a RunCoordinator, worker_id: usize) -> Self {
        Self {
            coordinator,
            worker_id,
        }
    }
}

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.coordinator
                .abort(format!("worker {} panicked", self.worker_id));
        }
    }
}
