/*!
 * Memory Watchdog
 *
 * Samples available memory on a fixed interval for the lifetime of one
 * supervised process and terminates its group when memory runs low.
 *
 * State machine: Idle -> Armed -> Triggered -> Retired. `Triggered` is only
 * reachable from `Armed` and terminate is issued from there exactly once.
 * Sampling stops as soon as the process exits through any path.
 */

use super::resource::ResourceMonitor;
use crate::core::limits::{DEFAULT_WATCHDOG_INTERVAL, DEFAULT_WATCHDOG_THRESHOLD};
use crate::core::types::{Bytes, Quantity};
use crate::process::{ProcessSupervisor, SupervisedProcess, TerminationReason};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchdogState {
    Idle = 0,
    Armed = 1,
    Triggered = 2,
    Retired = 3,
}

impl WatchdogState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WatchdogState::Idle,
            1 => WatchdogState::Armed,
            2 => WatchdogState::Triggered,
            _ => WatchdogState::Retired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    /// Terminate when available memory drops below this
    pub threshold: Bytes,
    pub interval: Duration,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_WATCHDOG_THRESHOLD,
            interval: DEFAULT_WATCHDOG_INTERVAL,
        }
    }
}

/// What the watchdog saw while it was armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogReport {
    pub triggered: bool,
    pub samples: u64,
    pub last_available: Option<Bytes>,
}

struct Shared {
    state: AtomicU8,
    fired: AtomicBool,
    samples: AtomicU64,
    last_available: Mutex<Option<Bytes>>,
}

impl Shared {
    fn state(&self) -> WatchdogState {
        WatchdogState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: WatchdogState, to: WatchdogState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn retire(&self) {
        self.state.store(WatchdogState::Retired as u8, Ordering::Release);
    }
}

/// Running watchdog bound to exactly one supervised process
pub struct MemoryWatchdog {
    shared: Arc<Shared>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl MemoryWatchdog {
    /// Arm a watchdog for `handle`. Sampling begins one interval from now.
    pub fn arm(
        monitor: Arc<dyn ResourceMonitor>,
        supervisor: Arc<ProcessSupervisor>,
        handle: Arc<SupervisedProcess>,
        settings: WatchdogSettings,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(WatchdogState::Idle as u8),
            fired: AtomicBool::new(false),
            samples: AtomicU64::new(0),
            last_available: Mutex::new(None),
        });
        let (stop, stop_rx) = watch::channel(false);

        shared.transition(WatchdogState::Idle, WatchdogState::Armed);
        debug!(
            pgid = handle.pgid(),
            threshold = %Quantity(settings.threshold),
            interval_ms = settings.interval.as_millis() as u64,
            "Memory watchdog armed"
        );

        let task = tokio::spawn(supervise(
            Arc::clone(&shared),
            monitor,
            supervisor,
            handle,
            settings,
            stop_rx,
        ));

        Self {
            shared,
            stop,
            task: Some(task),
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.shared.state()
    }

    /// Stop sampling and wait for the sampling task to finish.
    /// A termination already in flight completes before this returns.
    pub async fn retire(mut self) -> WatchdogReport {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Watchdog task failed");
            }
        }
        self.shared.retire();
        WatchdogReport {
            triggered: self.shared.fired.load(Ordering::Acquire),
            samples: self.shared.samples.load(Ordering::Acquire),
            last_available: *self.shared.last_available.lock(),
        }
    }

    /// Whether termination was issued
    pub fn fired(&self) -> bool {
        self.shared.fired.load(Ordering::Acquire)
    }
}

impl Drop for MemoryWatchdog {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

async fn supervise(
    shared: Arc<Shared>,
    monitor: Arc<dyn ResourceMonitor>,
    supervisor: Arc<ProcessSupervisor>,
    handle: Arc<SupervisedProcess>,
    settings: WatchdogSettings,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = handle.exited() => break,
            _ = ticker.tick() => {}
        }

        if handle.has_exited() || *stop.borrow() {
            break;
        }

        shared.samples.fetch_add(1, Ordering::AcqRel);
        let unsafe_reading = match monitor.available_memory() {
            Ok(available) => {
                *shared.last_available.lock() = Some(available);
                handle.touch();
                if available < settings.threshold {
                    warn!(
                        pgid = handle.pgid(),
                        available = %Quantity(available),
                        threshold = %Quantity(settings.threshold),
                        "Available memory below watchdog threshold"
                    );
                    true
                } else {
                    false
                }
            }
            Err(e) => {
                warn!(pgid = handle.pgid(), error = %e, "Memory sensor failed, assuming unsafe");
                true
            }
        };

        if unsafe_reading && shared.transition(WatchdogState::Armed, WatchdogState::Triggered) {
            shared.fired.store(true, Ordering::Release);
            if let Err(e) = supervisor
                .terminate(&handle, TerminationReason::LowMemory)
                .await
            {
                error!(pgid = handle.pgid(), error = %e, "Watchdog termination failed");
            }
            break;
        }
    }

    shared.retire();
    debug!(pgid = handle.pgid(), state = ?shared.state(), "Memory watchdog stopped");
}
