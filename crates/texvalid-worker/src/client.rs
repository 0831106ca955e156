use std::time::{Duration, Instant};

use crate::config::WorkerConfig;
use crate::protocol::Event;
use crate::reconciler::{Cursor, MarkerHost, Reconciler};

/// One-shot timer driven by the caller's clock.
#[derive(Debug, Clone)]
pub struct CursorDebounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl CursorDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Starts the timer, restarting it if already running.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once when the timer has expired.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Editor-side glue between worker events, cursor movement and the reconciler.
///
/// The editor forwards worker events, document edits and cursor moves, and
/// calls [`LintClient::poll`] from its timer loop.
pub struct LintClient<H: MarkerHost> {
    reconciler: Reconciler<H>,
    debounce: CursorDebounce,
}

impl<H: MarkerHost> LintClient<H> {
    pub fn new(host: H, config: &WorkerConfig) -> Self {
        Self {
            reconciler: Reconciler::new(host).with_max_diagnostics(config.max_diagnostics),
            debounce: CursorDebounce::new(config.cursor_debounce),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<H> {
        &self.reconciler
    }

    pub fn on_event(&mut self, event: Event, cursor: Cursor) {
        match event {
            Event::Lint { data } => {
                self.reconciler.apply(data, cursor);
            }
            Event::Terminate => {
                self.debounce.cancel();
                self.reconciler.dispose();
            }
        }
    }

    /// An edit is about to produce a fresh list, so a pending refresh is dropped.
    pub fn on_document_changed(&mut self) {
        self.debounce.cancel();
    }

    pub fn on_cursor_moved(&mut self, now: Instant) {
        if self.reconciler.has_suppressions() {
            self.debounce.arm(now);
        }
    }

    /// Runs a pending suppression refresh if it is due. Returns true if it ran.
    pub fn poll(&mut self, now: Instant, cursor: Cursor) -> bool {
        if self.debounce.fire(now) {
            self.reconciler.refresh(cursor);
            true
        } else {
            false
        }
    }

    /// When [`LintClient::poll`] next needs calling, if at all.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_fires_once() {
        let start = Instant::now();
        let mut debounce = CursorDebounce::new(Duration::from_millis(100));
        debounce.arm(start);
        assert!(!debounce.fire(start + Duration::from_millis(99)));
        assert!(debounce.fire(start + Duration::from_millis(100)));
        assert!(!debounce.fire(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_rearm_postpones() {
        let start = Instant::now();
        let mut debounce = CursorDebounce::new(Duration::from_millis(100));
        debounce.arm(start);
        debounce.arm(start + Duration::from_millis(80));
        assert!(!debounce.fire(start + Duration::from_millis(150)));
        assert!(debounce.fire(start + Duration::from_millis(180)));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut debounce = CursorDebounce::new(Duration::ZERO);
        debounce.arm(start);
        debounce.cancel();
        assert!(!debounce.fire(start));
        assert_eq!(debounce.deadline(), None);
    }
}
