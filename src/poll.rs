//! Bounded polling of a serviced protocol.
//!
//! Some protocol stacks make progress only while the caller hands them time.
//! [`poll_until`] alternates between checking a readiness predicate and
//! giving the stack one service slice, optionally giving up after a number
//! of slices. Time only passes inside [`Service::service`], so a fake
//! service makes the loop run instantly in tests.

use embassy_time::Duration;

use crate::log::{debug, trace, warn};

/// Something that advances when given time.
#[allow(async_fn_in_trait)]
pub trait Service {
    type Error;

    /// Drives the protocol for up to `slice`.
    async fn service(&mut self, slice: Duration) -> Result<(), Self::Error>;
}

/// How long to keep polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollPolicy {
    /// Service time between two readiness checks
    pub slice: Duration,
    /// Give up after this many slices; `None` polls forever
    pub max_slices: Option<u32>,
}

impl PollPolicy {
    /// Polls until the predicate holds, however long that takes.
    ///
    /// # Arguments
    ///
    /// * `slice` - Service time between two readiness checks
    pub const fn unbounded(slice: Duration) -> Self {
        Self {
            slice,
            max_slices: None,
        }
    }

    /// Polls for at most `max_slices` slices.
    ///
    /// # Arguments
    ///
    /// * `slice` - Service time between two readiness checks
    /// * `max_slices` - Slices to spend before giving up
    pub const fn bounded(slice: Duration, max_slices: u32) -> Self {
        Self {
            slice,
            max_slices: Some(max_slices),
        }
    }
}

/// Result of [`poll_until`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    /// The predicate held after `slices` service slices
    Ready { slices: u32 },
    /// The slice budget ran out first
    TimedOut { slices: u32 },
}

/// Services `target` in slices of `policy.slice` until `ready` holds.
///
/// The predicate is checked before the first slice, so an already ready
/// target costs no service time. A failing service call is logged and
/// counted as a spent slice; it does not end the wait.
pub async fn poll_until<T, F>(target: &mut T, policy: PollPolicy, ready: F) -> PollOutcome
where
    T: Service,
    F: Fn(&T) -> bool,
{
    let mut slices: u32 = 0;

    loop {
        if ready(&*target) {
            return PollOutcome::Ready { slices };
        }

        if let Some(max) = policy.max_slices {
            if slices >= max {
                return PollOutcome::TimedOut { slices };
            }
        }

        if target.service(policy.slice).await.is_err() {
            warn!("poll: service slice {} failed", slices);
        }
        slices = slices.saturating_add(1);

        trace!("poll: {} slices spent", slices);
    }
}

/// Growing pause between retries of a request the network did not answer.
///
/// Time is fed in by the caller through [`Backoff::elapse`], so the
/// schedule does not depend on a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
    remaining: Duration,
}

impl Backoff {
    /// Creates a backoff that allows the first attempt right away.
    ///
    /// # Arguments
    ///
    /// * `initial` - Pause after the first failure
    /// * `max` - Upper bound of the pause, reached by doubling
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
            remaining: Duration::from_ticks(0),
        }
    }

    /// Whether the next attempt may go out now.
    pub fn ready(&self) -> bool {
        self.remaining.as_ticks() == 0
    }

    /// Pause still to wait before the next attempt.
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Counts `spent` against the current pause.
    pub fn elapse(&mut self, spent: Duration) {
        self.remaining = self
            .remaining
            .checked_sub(spent)
            .unwrap_or(Duration::from_ticks(0));
    }

    /// Records an unanswered attempt and starts the next, longer pause.
    pub fn failed(&mut self) {
        self.remaining = self.next;
        self.next = (self.next * 2).min(self.max);
        debug!("backoff: next attempt in {} ms", self.remaining.as_millis());
    }

    /// Back to the initial schedule after a success.
    pub fn reset(&mut self) {
        self.next = self.initial;
        self.remaining = Duration::from_ticks(0);
    }
}
