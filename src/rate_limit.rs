use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::{log, ClientOptions};

/// Admission gate limiting successful requests per time window.
///
/// When the quota of the current window is used up, [`RateLimiter::admit`]
/// sleeps until the window ends, optionally running a caller hook first.
#[derive(Debug)]
pub struct RateLimiter {
    quota: u32,
    window: Duration,
    count: u32,
    window_end: Instant,
    logging: bool,
}

impl RateLimiter {
    /// Creates a limiter admitting `quota` requests per `window`.
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            quota,
            window,
            count: 0,
            window_end: Instant::now() + window,
            logging: true,
        }
    }

    /// Builds the limiter configured by `req_limit`/`req_time_range`, if both are set.
    pub(crate) fn from_options(options: &ClientOptions) -> Option<Self> {
        let quota = options.req_limit?;
        let range = options.req_time_range?;
        let mut limiter = Self::new(quota, Duration::from_secs(range));
        limiter.logging = options.logging;
        Some(limiter)
    }

    /// Requests recorded in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Counts one request against the current window.
    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Waits until a request may be issued.
    ///
    /// The hook runs at most once, and only when the call actually blocks.
    pub async fn admit<'h>(&mut self, hook: Option<&mut (dyn FnMut() + Send + 'h)>) {
        if self.count >= self.quota && Instant::now() <= self.window_end {
            let mut secs = self.remaining_secs();
            log::debug(
                self.logging,
                &format!(
                    "request limit ({} per {}secs) reached, sleeping {secs} seconds",
                    self.quota,
                    self.window.as_secs()
                ),
            );
            if let Some(hook) = hook {
                hook();
                secs = self.remaining_secs();
                log::debug(
                    self.logging,
                    &format!("limit hook executed, sleeping {secs}secs"),
                );
            }
            if secs > 0 {
                sleep(Duration::from_secs(secs)).await;
            }
        }

        let now = Instant::now();
        if now > self.window_end {
            log::debug(
                self.logging,
                &format!(
                    "resetting request counter ({}/{} requests done)",
                    self.count, self.quota
                ),
            );
            self.count = 0;
            self.window_end = now + self.window;
        }
    }

    /// Whole seconds until one second past the window end.
    fn remaining_secs(&self) -> u64 {
        (self.window_end + Duration::from_secs(1))
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}
