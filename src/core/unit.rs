use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::event::{Event, EventQueue, Priority};
use super::resource::{ResourceAmount, ResourceStatus};
use super::types::UnitId;

/// Default pause after a failed consume or store, so a blocked unit retries
/// without busy-spinning or flooding the queue with duplicate events.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Speed modifier applied to a unit's nominal processing time, plus the
/// terminal shutdown flag. Written only by the controller; units read it at
/// the top of every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ThrottleState {
    Standard = 0,
    Slow = 1,
    Fast = 2,
    Terminate = 3,
}

impl ThrottleState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ThrottleState::Standard,
            1 => ThrottleState::Slow,
            2 => ThrottleState::Fast,
            _ => ThrottleState::Terminate,
        }
    }

    /// Scale a nominal processing time by this state's modifier: `Slow` is
    /// 2x, `Fast` is half.
    pub fn scale(self, nominal: Duration) -> Duration {
        match self {
            ThrottleState::Slow => nominal * 2,
            ThrottleState::Fast => nominal / 2,
            _ => nominal,
        }
    }
}

/// Shared throttle slot, read by the unit thread and written by the
/// controller.
///
/// `Terminate` is sticky: once set, later writes return without effect, so
/// controller writes after a unit has exited are harmless no-ops.
pub struct ThrottleCell(AtomicU8);

impl ThrottleCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ThrottleState::Standard as u8))
    }

    pub fn get(&self) -> ThrottleState {
        ThrottleState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Set the throttle state, returning the previous state. No-op once the
    /// cell holds `Terminate`.
    pub fn set(&self, next: ThrottleState) -> ThrottleState {
        let mut current = self.get();
        loop {
            if current == ThrottleState::Terminate {
                return current;
            }
            match self.0.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current,
                Err(raw) => current = ThrottleState::from_raw(raw),
            }
        }
    }
}

impl Default for ThrottleCell {
    fn default() -> Self {
        Self::new()
    }
}

/// An autonomous actor that repeatedly converts one resource into another.
///
/// Each cycle first *converts* (withdraw the declared input, simulate the
/// processing time, buffer the declared output) and then *stores* the
/// buffered output into the produced resource. Keeping the two phases
/// separate lets a unit hold finished output while its downstream sink is
/// full, without ever consuming input it cannot pay for. Failures of either
/// phase are reported as events and retried on the next cycle; only a
/// `Terminate` throttle state stops the loop.
pub struct ProductionUnit {
    name: UnitId,
    /// `None` means the unit requires no input; conversion always succeeds.
    consumed: Option<ResourceAmount>,
    /// `None` means the unit discards its output.
    produced: Option<ResourceAmount>,
    processing_time: Duration,
    retry_interval: Duration,
    /// Produced amount not yet committed to the output resource. Drained
    /// before a new conversion begins.
    pending_output: u64,
    throttle: Arc<ThrottleCell>,
    queue: Arc<EventQueue>,
}

impl ProductionUnit {
    pub fn new(
        name: impl Into<UnitId>,
        consumed: Option<ResourceAmount>,
        produced: Option<ResourceAmount>,
        processing_time: Duration,
        queue: Arc<EventQueue>,
    ) -> Self {
        Self {
            name: name.into(),
            consumed,
            produced,
            processing_time,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            pending_output: 0,
            throttle: Arc::new(ThrottleCell::new()),
            queue,
        }
    }

    /// Override the pause between retries after a failed consume or store.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle the controller uses to adjust this unit's speed.
    pub fn throttle(&self) -> Arc<ThrottleCell> {
        self.throttle.clone()
    }

    pub fn consumed(&self) -> Option<&ResourceAmount> {
        self.consumed.as_ref()
    }

    pub fn produced(&self) -> Option<&ResourceAmount> {
        self.produced.as_ref()
    }

    pub fn pending_output(&self) -> u64 {
        self.pending_output
    }

    /// Blocking entry point: run conversion/storage cycles until the
    /// controller sets the throttle to `Terminate`. Cancellation is
    /// cooperative; an in-flight sleep finishes before the state is
    /// rechecked.
    pub fn run(&mut self) {
        debug!("{}: unit started", self.name);
        while self.throttle.get() != ThrottleState::Terminate {
            self.step();
        }
        debug!("{}: unit terminated", self.name);
    }

    /// One conversion/storage cycle.
    pub fn step(&mut self) {
        if self.pending_output == 0 {
            self.convert();
        }
        if self.pending_output > 0 {
            self.store();
        }
    }

    /// Withdraw the declared input, simulate processing, buffer the output.
    /// On shortage, report a high-priority event and back off.
    fn convert(&mut self) {
        let status = match &self.consumed {
            None => ResourceStatus::Ok,
            Some(input) => input.resource().try_consume(input.amount()),
        };

        if status == ResourceStatus::Ok {
            thread::sleep(self.throttle.get().scale(self.processing_time));
            if let Some(output) = &self.produced {
                self.pending_output = output.amount();
                trace!("{}: converted, {} pending", self.name, self.pending_output);
            }
        } else if let Some(input) = &self.consumed {
            debug!(
                "{}: input {} unavailable ({:?})",
                self.name,
                input.resource().name(),
                status
            );
            self.queue.push(Event::new(
                self.name.clone(),
                input.resource().name(),
                status,
                Priority::High,
                input.amount(),
            ));
            thread::sleep(self.retry_interval);
        }
    }

    /// Commit pending output to the produced resource. On overflow, keep the
    /// remainder buffered, report a low-priority event and back off.
    fn store(&mut self) {
        let output = match &self.produced {
            Some(output) => output,
            None => {
                self.pending_output = 0;
                return;
            }
        };

        let outcome = output.resource().try_store(self.pending_output);
        self.pending_output = outcome.remainder;

        if outcome.status == ResourceStatus::CapacityFull {
            debug!(
                "{}: output {} full, {} unstored",
                self.name,
                output.resource().name(),
                outcome.remainder
            );
            self.queue.push(Event::new(
                self.name.clone(),
                output.resource().name(),
                ResourceStatus::CapacityFull,
                Priority::Low,
                outcome.remainder,
            ));
            thread::sleep(self.retry_interval);
        }
    }
}
