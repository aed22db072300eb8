//! Inactivity timer: clear sessions when the operator walks away
//!
//! A single background task wakes on a fixed tick, compares idle time against
//! the configured timeout, and fires the lock callback at most once per
//! elapsed timeout (activity is reset after firing). `touch` marks activity;
//! `stop` cancels the task and joins it so no callback can fire afterwards.
//! Start and stop are idempotent and safe to interleave.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Scheduler wake period.
const TICK: Duration = Duration::from_secs(30);

struct LockState {
    enabled: bool,
    timeout: Duration,
    last_activity: Instant,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct AutoLock {
    state: Arc<Mutex<LockState>>,
    worker: Mutex<Option<Worker>>,
    tick: Duration,
}

impl AutoLock {
    pub fn new(timeout: Duration) -> Self {
        Self::with_tick(timeout, TICK)
    }

    /// Like `new` but with a custom scheduler period. Tests shorten it;
    /// production uses the 30-second default.
    pub fn with_tick(timeout: Duration, tick: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState {
                enabled: true,
                timeout,
                last_activity: Instant::now(),
            })),
            worker: Mutex::new(None),
            tick,
        }
    }

    /// Spawn the background checker. A second start while running is a no-op.
    pub fn start(&self, on_lock: Arc<dyn Fn() + Send + Sync>) {
        let mut slot = self.worker.lock().expect("autolock lock poisoned");
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let state = Arc::clone(&self.state);
        let tick = self.tick;
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(tick) => check(&state, &on_lock),
                }
            }
        });

        *slot = Some(Worker { cancel, handle });
        debug!("auto-lock started");
    }

    /// Cancel the checker and wait for it to finish. Idempotent; after this
    /// returns, no further callback fires until the next `start`.
    pub async fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .expect("autolock lock poisoned")
            .take();

        if let Some(worker) = worker {
            worker.cancel.cancel();
            let _ = worker.handle.await;
            debug!("auto-lock stopped");
        }
    }

    /// Record activity, pushing the deadline out.
    pub fn touch(&self) {
        self.state.lock().expect("autolock lock poisoned").last_activity = Instant::now();
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.state.lock().expect("autolock lock poisoned").timeout = timeout;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().expect("autolock lock poisoned").enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().expect("autolock lock poisoned").enabled
    }

    /// Time until the callback would fire, zero when disabled or overdue.
    pub fn time_remaining(&self) -> Duration {
        let state = self.state.lock().expect("autolock lock poisoned");
        if !state.enabled {
            return Duration::ZERO;
        }
        state
            .timeout
            .saturating_sub(state.last_activity.elapsed())
    }
}

fn check(state: &Arc<Mutex<LockState>>, on_lock: &Arc<dyn Fn() + Send + Sync>) {
    let fire = {
        let mut state = state.lock().expect("autolock lock poisoned");
        if state.enabled && state.last_activity.elapsed() > state.timeout {
            state.last_activity = Instant::now();
            true
        } else {
            false
        }
    };

    if fire {
        info!("auto-lock timeout reached");
        on_lock();
    }
}
