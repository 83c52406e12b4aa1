//! Sliding-window request admission shared by all workers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Length of the trailing window the targets apply to.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Extra wait added once the oldest request leaves the window.
pub const DEFAULT_MARGIN: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct RateWindow {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&t) = self.requests.front() {
            if now.duration_since(t) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(t, _)) = self.tokens.front() {
            if now.duration_since(t) >= window {
                self.tokens.pop_front();
            } else {
                break;
            }
        }
    }

    fn token_sum(&self) -> u64 {
        self.tokens.iter().map(|(_, n)| n).sum()
    }
}

/// Keeps requests under `rpm_target` per window; token usage is advisory.
#[derive(Debug)]
pub struct RateLimiter {
    rpm_target: usize,
    tpm_target: u64,
    window: Duration,
    margin: Duration,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Limiter over a 60 second window.
    pub fn new(rpm_target: u32, tpm_target: u64) -> Self {
        Self::with_window(rpm_target, tpm_target, DEFAULT_WINDOW, DEFAULT_MARGIN)
    }

    /// Limiter with a custom window and safety margin.
    pub fn with_window(rpm_target: u32, tpm_target: u64, window: Duration, margin: Duration) -> Self {
        Self {
            rpm_target: (rpm_target as usize).max(1),
            tpm_target,
            window,
            margin,
            state: Mutex::new(RateWindow::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateWindow> {
        // The window stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until one more request fits in the window, then record it.
    ///
    /// Returns how long the caller waited.
    pub fn admit(&self) -> Duration {
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.lock();
                let now = Instant::now();
                state.prune(now, self.window);

                if state.requests.len() < self.rpm_target {
                    state.requests.push_back(now);
                    return started.elapsed();
                }

                match state.requests.front() {
                    Some(&oldest) => (oldest + self.window + self.margin).saturating_duration_since(now),
                    None => self.margin,
                }
            };

            debug!("Rate limit: waiting {:.2}s", wait.as_secs_f64());
            std::thread::sleep(wait);
        }
    }

    /// Record tokens sent with an admitted request.
    pub fn record(&self, tokens: u64) {
        let mut state = self.lock();
        let now = Instant::now();
        state.tokens.push_back((now, tokens));
        state.prune(now, self.window);

        let total = state.token_sum();
        if total >= self.tpm_target {
            warn!("TPM near limit: {}/{}", total, self.tpm_target);
        }
    }

    /// Requests and tokens in the trailing window.
    pub fn usage(&self) -> (usize, u64) {
        let mut state = self.lock();
        state.prune(Instant::now(), self.window);
        (state.requests.len(), state.token_sum())
    }

    pub fn rpm_target(&self) -> usize {
        self.rpm_target
    }

    pub fn tpm_target(&self) -> u64 {
        self.tpm_target
    }
}
