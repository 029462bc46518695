//! Graceful shutdown controller with in-flight request tracking.
//!
//! Uses `ArcSwap` for lock-free health state transitions and an atomic
//! counter with RAII guards for in-flight request tracking. The last guard
//! to drop wakes any task waiting for the drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Notify;

/// Server health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Server is initializing (not yet accepting requests).
    Starting,
    /// Server is fully operational and accepting requests.
    Ready,
    /// Server is draining in-flight requests (no new requests accepted).
    Draining,
    /// Server has fully stopped (all in-flight requests completed).
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    drained: Notify,
}

/// Coordinates graceful shutdown across the server.
///
/// 1. Readiness probes check `health_state()`
/// 2. The in-flight middleware refuses new requests once draining
/// 3. `trigger_shutdown()` moves to Draining
/// 4. `wait_for_drain()` waits until in-flight requests complete
#[derive(Debug)]
pub struct ShutdownController {
    in_flight: Arc<InFlight>,
    health_state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a new shutdown controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(InFlight::default()),
            health_state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    /// Transitions to the `Ready` state, indicating the server can accept requests.
    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Transitions to `Draining`. New requests are refused from here on.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
    }

    /// Returns the current health state.
    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Whether new requests should be admitted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        matches!(
            self.health_state(),
            HealthState::Starting | HealthState::Ready
        )
    }

    /// Creates an RAII guard that tracks an in-flight request.
    ///
    /// The counter is decremented when the guard is dropped, including
    /// during unwinding.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Returns the current number of in-flight requests.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits for all in-flight requests to complete, up to `timeout`.
    ///
    /// Returns `true` and transitions to `Stopped` if everything drained.
    /// Returns `false` if the timeout expired (state remains `Draining`).
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.in_flight.drained.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.health_state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.drained.notify_waiters();
        }
    }
}
