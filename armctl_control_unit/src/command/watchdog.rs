//! Streaming command watchdog.
//!
//! Only one streaming motion is active at a time, so the watchdog tracks a
//! single source: the one that last refreshed it. Once per tick the control
//! loop asks whether that source has gone quiet for longer than the
//! timeout. Goal-based motions are not watched; they carry their own max
//! duration.

use std::time::{Duration, Instant};

use armctl_common::command::SourceId;

#[derive(Debug, Clone)]
pub struct StreamWatchdog {
    timeout: Duration,
    last_refresh: Option<(SourceId, Instant)>,
}

impl StreamWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_refresh: None,
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a streaming command from `source` at `now`, replacing any
    /// other source.
    pub fn refresh(&mut self, source: SourceId, now: Instant) {
        self.last_refresh = Some((source, now));
    }

    /// Whether `source` has not refreshed within the timeout.
    ///
    /// A source that is not the tracked one counts as expired.
    pub fn is_expired(&self, source: SourceId, now: Instant) -> bool {
        match self.last_refresh {
            Some((tracked, last)) if tracked == source => {
                now.saturating_duration_since(last) > self.timeout
            }
            _ => true,
        }
    }

    /// Forget the tracked source unless it is `keep`.
    pub fn retain_only(&mut self, keep: Option<SourceId>) {
        if self.last_refresh.is_some_and(|(source, _)| Some(source) != keep) {
            self.last_refresh = None;
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
