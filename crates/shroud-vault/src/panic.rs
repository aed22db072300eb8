//! Panic latch: encrypt everything with a session, exactly once
//!
//! The latch guards against a mashed hotkey: concurrent or rapid triggers run
//! the callback at most once per window (5 seconds), after which the latch
//! re-arms. The fan-out helper walks the caller-discovered open drives and
//! quick-encrypts each one, collecting per-drive failures without surfacing
//! them — a panic must not stop at the first sick drive.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shroud_core::VaultError;

use crate::pipeline::{self, VaultOptions};
use crate::session::SessionStore;

const REARM_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct PanicStats {
    pub trigger_count: u64,
    pub last_triggered: Option<SystemTime>,
}

struct LatchInner {
    triggered: AtomicBool,
    window: Duration,
    stats: Mutex<PanicStats>,
}

/// Cheaply cloneable handle; clones share one latch.
#[derive(Clone)]
pub struct PanicLatch {
    inner: Arc<LatchInner>,
}

impl PanicLatch {
    pub fn new() -> Self {
        Self::with_window(REARM_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            inner: Arc::new(LatchInner {
                triggered: AtomicBool::new(false),
                window,
                stats: Mutex::new(PanicStats::default()),
            }),
        }
    }

    /// Run `f` unless a trigger already fired inside the current window.
    /// Returns whether the callback ran. The latch re-arms on a background
    /// timer, so a held-down hotkey produces one action, not a storm.
    pub fn trigger<F: FnOnce()>(&self, f: F) -> bool {
        if self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        {
            let mut stats = self.inner.stats.lock().expect("panic stats lock poisoned");
            stats.trigger_count += 1;
            stats.last_triggered = Some(SystemTime::now());
        }

        info!("panic triggered");
        f();

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            inner.triggered.store(false, Ordering::SeqCst);
        });

        true
    }

    pub fn stats(&self) -> PanicStats {
        self.inner
            .stats
            .lock()
            .expect("panic stats lock poisoned")
            .clone()
    }
}

impl Default for PanicLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// A drive the shell found in the open state.
#[derive(Debug, Clone)]
pub struct OpenDrive {
    pub path: PathBuf,
    pub drive_id: String,
}

/// Quick-encrypt every open drive that has a cached session.
///
/// Individual failures are collected and logged, never propagated; the next
/// drive is always attempted.
pub fn panic_encrypt_all(
    drives: &[OpenDrive],
    sessions: &SessionStore,
    opts: &VaultOptions,
    cancel: &CancellationToken,
) -> Vec<(String, VaultError)> {
    let mut failures = Vec::new();

    for drive in drives {
        if !sessions.has(&drive.drive_id) {
            continue;
        }
        match pipeline::quick_encrypt(&drive.path, &drive.drive_id, opts, sessions, cancel, None) {
            Ok(()) => info!(drive_id = %drive.drive_id, "panic-encrypted"),
            Err(e) => {
                warn!(drive_id = %drive.drive_id, "panic encryption failed: {e}");
                failures.push((drive.drive_id.clone(), e));
            }
        }
    }

    failures
}
