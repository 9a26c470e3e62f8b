//! Request admission control
//!
//! Every outgoing request takes one token from each of three fixed windows
//! (second, minute, hour). A window refills completely once its whole
//! duration has elapsed since it started; it does not slide. Separately, a
//! counter bounds how many sessions may be open at once.
//!
//! The check across all three windows and the decrement happen under one
//! lock, so concurrent callers can never oversell a window.

use crate::config::RateLimitConfig;
use crate::{ClientError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The three admission windows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateWindowKind {
    Second,
    Minute,
    Hour,
}

impl RateWindowKind {
    /// Windows in the order they are checked
    pub const ALL: [RateWindowKind; 3] = [Self::Second, Self::Minute, Self::Hour];

    /// Length of the window
    pub fn duration(&self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3600),
        }
    }
}

impl fmt::Display for RateWindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
        })
    }
}

/// One fixed window
#[derive(Clone, Debug)]
pub struct RateWindow {
    kind: RateWindowKind,
    capacity: u32,
    remaining: u32,
    window_start: Instant,
}

impl RateWindow {
    fn new(kind: RateWindowKind, capacity: u32, now: Instant) -> Self {
        Self {
            kind,
            capacity,
            remaining: capacity,
            window_start: now,
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }

    fn has_elapsed(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.kind.duration()
    }

    /// Restore full capacity once the window has run its course
    fn refresh(&mut self, now: Instant) {
        if self.has_elapsed(now) {
            self.remaining = self.capacity;
            self.window_start = now;
        }
    }

    /// Tokens left at `now`, counting a pending refill
    fn remaining_at(&self, now: Instant) -> u32 {
        if self.has_elapsed(now) {
            self.capacity
        } else {
            self.remaining
        }
    }

    fn retry_after(&self, now: Instant) -> Duration {
        self.kind.duration().saturating_sub(self.elapsed(now))
    }

    pub fn kind(&self) -> RateWindowKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[derive(Debug)]
struct LimiterState {
    windows: [RateWindow; 3],
    active_sessions: u32,
}

impl LimiterState {
    fn release_session(&mut self) {
        self.active_sessions = self.active_sessions.saturating_sub(1);
    }
}

/// Snapshot of the limiter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// No request would be admitted right now
    pub saturated: bool,
    /// Wait until a request would be admitted, when saturated
    pub retry_after: Option<Duration>,
    /// First exhausted window in check order
    pub exhausted_window: Option<RateWindowKind>,
    /// Tokens left per window, in check order
    pub remaining: [(RateWindowKind, u32); 3],
    pub active_sessions: u32,
    pub max_concurrent_sessions: u32,
}

impl RateLimitStatus {
    /// No further session may be opened right now
    pub fn sessions_saturated(&self) -> bool {
        self.active_sessions >= self.max_concurrent_sessions
    }
}

/// Fixed-window rate limiter with a concurrent-session gate
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    /// Create a limiter with all windows full
    pub fn new(config: RateLimitConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    /// Create a limiter whose windows start at `now`
    pub fn new_at(config: RateLimitConfig, now: Instant) -> Self {
        let capacities = [
            config.requests_per_second,
            config.requests_per_minute,
            config.requests_per_hour,
        ];
        let windows =
            [0, 1, 2].map(|i| RateWindow::new(RateWindowKind::ALL[i], capacities[i], now));
        Self {
            config,
            state: Arc::new(Mutex::new(LimiterState {
                windows,
                active_sessions: 0,
            })),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    // ==================== Request tokens ====================

    /// Admit one request or report which window is exhausted
    pub fn acquire_token(&self) -> Result<()> {
        self.acquire_token_at(Instant::now())
    }

    /// [`acquire_token`](Self::acquire_token) at an explicit instant
    pub fn acquire_token_at(&self, now: Instant) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut state = self.state.lock();
        for window in state.windows.iter_mut() {
            window.refresh(now);
        }
        if let Some(window) = state.windows.iter().find(|w| w.remaining == 0) {
            let retry_after = window.retry_after(now);
            debug!(window = %window.kind, ?retry_after, "request rejected by rate limiter");
            return Err(ClientError::RateLimitExceeded {
                window: window.kind,
                retry_after,
            });
        }
        for window in state.windows.iter_mut() {
            window.remaining -= 1;
        }
        Ok(())
    }

    /// Wait until a request is admitted
    pub async fn acquire_token_wait(&self) {
        loop {
            match self.acquire_token() {
                Ok(()) => return,
                Err(e) => {
                    let wait = e.retry_after().unwrap_or(Duration::from_millis(10));
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    // ==================== Sessions ====================

    /// Claim a session slot
    ///
    /// A disabled limiter never refuses, but still counts open sessions.
    pub fn acquire_session(&self) -> Result<()> {
        let mut state = self.state.lock();
        if self.config.enabled && state.active_sessions >= self.config.max_concurrent_sessions {
            warn!(max = self.config.max_concurrent_sessions, "concurrent session limit reached");
            return Err(ClientError::ConcurrencySessionLimitExceeded {
                max: self.config.max_concurrent_sessions,
            });
        }
        state.active_sessions = state.active_sessions.saturating_add(1);
        Ok(())
    }

    /// Return a session slot; never drops below zero
    pub fn release_session(&self) {
        self.state.lock().release_session();
    }

    /// Claim a session slot that is returned when the permit is dropped
    pub fn acquire_session_permit(&self) -> Result<SessionPermit> {
        self.acquire_session()?;
        Ok(SessionPermit {
            state: Some(Arc::clone(&self.state)),
        })
    }

    /// Number of sessions currently held
    pub fn active_sessions(&self) -> u32 {
        self.state.lock().active_sessions
    }

    // ==================== Status ====================

    /// Current saturation and earliest retry
    pub fn status(&self) -> RateLimitStatus {
        self.status_at(Instant::now())
    }

    /// [`status`](Self::status) at an explicit instant
    pub fn status_at(&self, now: Instant) -> RateLimitStatus {
        let state = self.state.lock();
        let remaining = [0, 1, 2].map(|i| {
            let window = &state.windows[i];
            (window.kind, window.remaining_at(now))
        });
        let (exhausted_window, retry_after) = if self.config.enabled {
            let exhausted: Vec<&RateWindow> = state
                .windows
                .iter()
                .filter(|w| w.remaining_at(now) == 0)
                .collect();
            (
                exhausted.first().map(|w| w.kind),
                exhausted.iter().map(|w| w.retry_after(now)).max(),
            )
        } else {
            (None, None)
        };
        RateLimitStatus {
            saturated: exhausted_window.is_some(),
            retry_after,
            exhausted_window,
            remaining,
            active_sessions: state.active_sessions,
            max_concurrent_sessions: self.config.max_concurrent_sessions,
        }
    }
}

/// A held session slot, released on drop
#[derive(Debug)]
pub struct SessionPermit {
    state: Option<Arc<Mutex<LimiterState>>>,
}

impl SessionPermit {
    /// Release the slot now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.lock().release_session();
        }
    }
}
