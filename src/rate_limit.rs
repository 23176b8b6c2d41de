use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// What a limit applies to; each bucket keeps its own windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    Login,
    Message,
    Upload,
}

/// Sliding window limiter keyed by bucket and subject (ip or user id). Process local.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    windows: Arc<DashMap<(Bucket, String), VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { windows: Arc::new(DashMap::new()), enabled }
    }

    /// Records a hit and reports whether it fits in the window.
    pub fn hit(&self, bucket: Bucket, subject: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut hits = self.windows.entry((bucket, subject.to_owned())).or_default();
        let live = hits.iter().position(|t| now.duration_since(*t) < window).unwrap_or(hits.len());
        hits.drain(..live);
        if hits.len() >= limit {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Drops subjects with no hit inside their bucket's window.
    pub fn prune(&self, window_for: impl Fn(Bucket) -> Duration) {
        let now = Instant::now();
        self.windows
            .retain(|(bucket, _), hits| hits.back().is_some_and(|t| now.duration_since(*t) < window_for(*bucket)));
    }

    /// Number of tracked (bucket, subject) pairs.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Checks between two sweeps of idle subjects.
const SWEEP_EVERY: u64 = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub login_limit: usize,
    pub login_window: Duration,
    pub message_limit: usize,
    pub message_window: Duration,
    pub upload_limit: usize,
    pub upload_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_limit: 10,
            login_window: Duration::from_secs(60),
            message_limit: 30,
            message_window: Duration::from_secs(60),
            upload_limit: 10,
            upload_window: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    /// `RL_<BUCKET>_LIMIT` and `RL_<BUCKET>_WINDOW` (seconds) override the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let limit = |name: &str, default: usize| std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
        let window = |name: &str, default: Duration| {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default)
        };
        Self {
            login_limit: limit("RL_LOGIN_LIMIT", d.login_limit),
            login_window: window("RL_LOGIN_WINDOW", d.login_window),
            message_limit: limit("RL_MESSAGE_LIMIT", d.message_limit),
            message_window: window("RL_MESSAGE_WINDOW", d.message_window),
            upload_limit: limit("RL_UPLOAD_LIMIT", d.upload_limit),
            upload_window: window("RL_UPLOAD_WINDOW", d.upload_window),
        }
    }

    fn for_bucket(&self, bucket: Bucket) -> (usize, Duration) {
        match bucket {
            Bucket::Login => (self.login_limit, self.login_window),
            Bucket::Message => (self.message_limit, self.message_window),
            Bucket::Upload => (self.upload_limit, self.upload_window),
        }
    }
}

/// Handler-facing guard: one call per limited action.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
    checks: Arc<AtomicU64>,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg, checks: Arc::new(AtomicU64::new(0)) }
    }

    pub fn allow(&self, bucket: Bucket, subject: &str) -> bool {
        let (limit, window) = self.cfg.for_bucket(bucket);
        let allowed = self.limiter.hit(bucket, subject, limit, window);
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.limiter.prune(|b| self.cfg.for_bucket(b).1);
        }
        allowed
    }

    pub fn allow_login(&self, ip: &str) -> bool {
        self.allow(Bucket::Login, ip)
    }
    pub fn allow_message(&self, user: &str) -> bool {
        self.allow(Bucket::Message, user)
    }
    pub fn allow_upload(&self, user: &str) -> bool {
        self.allow(Bucket::Upload, user)
    }
}
