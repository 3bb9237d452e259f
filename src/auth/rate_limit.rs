//! Per-client token buckets for login/registration and complaint submission.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::config::RateLimitConfig;
use crate::error::AppError;

/// Prune idle keys once the table grows past this.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Clone)]
pub struct KeyedLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
    message: &'static str,
}

impl KeyedLimiter {
    /// `max_requests` per `window_seconds`, refilled evenly across the window.
    pub fn new(config: &RateLimitConfig, message: &'static str) -> Result<Self, AppError> {
        let burst = NonZeroU32::new(config.max_requests)
            .ok_or_else(|| AppError::Config("rate limit max_requests must be > 0".into()))?;
        let period = Duration::from_secs(config.window_seconds) / burst.get();
        let quota = Quota::with_period(period)
            .ok_or_else(|| AppError::Config("rate limit window must be > 0".into()))?
            .allow_burst(burst);
        Ok(Self { limiter: Arc::new(RateLimiter::keyed(quota)), message })
    }

    pub fn check(&self, key: &str) -> Result<(), AppError> {
        if self.limiter.len() > PRUNE_THRESHOLD {
            self.limiter.retain_recent();
        }
        self.limiter
            .check_key(&key.to_string())
            .map_err(|_| AppError::RateLimited(self.message.to_string()))
    }
}

#[derive(Clone)]
pub struct RateLimits {
    pub auth: KeyedLimiter,
    pub submit: KeyedLimiter,
}

impl RateLimits {
    pub fn new(auth: &RateLimitConfig, submit: &RateLimitConfig) -> Result<Self, AppError> {
        Ok(Self {
            auth: KeyedLimiter::new(auth, "Too many authentication attempts. Please try again later.")?,
            submit: KeyedLimiter::new(submit, "Too many complaints submitted. Please try again later.")?,
        })
    }
}
