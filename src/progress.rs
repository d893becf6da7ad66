//! Progress reporting and cooperative cancellation.
//!
//! Grounded on the `versatiles_core` progress traits' `ProgressTrait`/
//! `get_progress_bar` pattern: a small trait plus a terminal implementation
//! and a no-op/test double, rather than one concrete struct baked into the
//! engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Progress reporting plus cooperative cancellation polling.
pub trait ProgressSink: Send + Sync {
    fn set_max(&self, n: u64);
    fn add_progress(&self, delta: u64);
    fn is_active(&self) -> bool;
    fn cleanup_on_cancel(&self) -> bool;
}

/// A terminal progress bar. Cancellation is permanently `true` — driving
/// programs that want cancellation compose a [`CountingProgress`] or their
/// own `AtomicBool`-backed sink instead.
pub struct TerminalProgress {
    message: String,
    max: AtomicU64,
    pos: AtomicU64,
    start: Instant,
}

impl TerminalProgress {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            max: AtomicU64::new(0),
            pos: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    fn redraw(&self) {
        let max = self.max.load(Ordering::Relaxed).max(1);
        let pos = self.pos.load(Ordering::Relaxed).min(max);
        let percent = (pos * 100) / max;
        let elapsed = self.start.elapsed().as_secs_f64().max(0.001);
        let per_sec = pos as f64 / elapsed;
        eprint!("\r{} {}/{} ({percent}%) {per_sec:.1}/s", self.message, pos, max);
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }
}

impl ProgressSink for TerminalProgress {
    fn set_max(&self, n: u64) {
        self.max.store(n, Ordering::Relaxed);
        self.redraw();
    }

    fn add_progress(&self, delta: u64) {
        self.pos.fetch_add(delta, Ordering::Relaxed);
        self.redraw();
    }

    fn is_active(&self) -> bool {
        true
    }

    fn cleanup_on_cancel(&self) -> bool {
        false
    }
}

/// A test double that counts calls to `add_progress` and flips `is_active`
/// to `false` once a configured call count is reached. Used to drive
/// mid-generation cancellation scenarios.
pub struct CountingProgress {
    max: AtomicU64,
    pos: AtomicU64,
    calls: AtomicU64,
    cancel_after_calls: Option<u64>,
    cleanup: bool,
}

impl CountingProgress {
    #[must_use]
    pub fn new(cleanup_on_cancel: bool) -> Self {
        Self {
            max: AtomicU64::new(0),
            pos: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            cancel_after_calls: None,
            cleanup: cleanup_on_cancel,
        }
    }

    #[must_use]
    pub fn cancel_after(mut self, calls: u64) -> Self {
        self.cancel_after_calls = Some(calls);
        self
    }

    #[must_use]
    pub fn progress(&self) -> u64 {
        self.pos.load(Ordering::Relaxed)
    }
}

impl ProgressSink for CountingProgress {
    fn set_max(&self, n: u64) {
        self.max.store(n, Ordering::Relaxed);
    }

    fn add_progress(&self, delta: u64) {
        self.pos.fetch_add(delta, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn is_active(&self) -> bool {
        match self.cancel_after_calls {
            Some(n) => self.calls.load(Ordering::Relaxed) < n,
            None => true,
        }
    }

    fn cleanup_on_cancel(&self) -> bool {
        self.cleanup
    }
}

/// Always-active sink with no cleanup — the default for callers that don't
/// need cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_max(&self, _n: u64) {}
    fn add_progress(&self, _delta: u64) {}
    fn is_active(&self) -> bool {
        true
    }
    fn cleanup_on_cancel(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_progress_cancels_after_n_calls() {
        let sink = CountingProgress::new(true).cancel_after(3);
        assert!(sink.is_active());
        sink.add_progress(1);
        sink.add_progress(1);
        assert!(sink.is_active());
        sink.add_progress(1);
        assert!(!sink.is_active());
        assert_eq!(sink.progress(), 3);
    }
}
