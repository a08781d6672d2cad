//! Bridge configuration.
//!
//! `Default` reads `GCBRIDGE_*` environment variables and falls back to the
//! built-in values. Durations below their floor are raised to it.

use std::time::Duration;

pub const DEFAULT_APP_ID: u32 = 730;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);
pub const MIN_READINESS_TIMEOUT: Duration = Duration::from_millis(3000);
pub const MIN_HANDSHAKE_RETRY_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_APP_ACTIVE_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Application whose coordinator the bridge talks to.
    pub app_id: u32,
    /// How often the processor looks for PENDING work.
    pub poll_interval: Duration,
    /// Default wait for a GC reply. Tasks may override it.
    pub request_timeout: Duration,
    /// How long a request waits for the welcome before failing.
    pub readiness_timeout: Duration,
    /// Delay between a lost session and the next login attempt.
    pub reconnect_delay: Duration,
    /// Hello resend period while waiting for the welcome.
    pub handshake_retry_interval: Duration,
    /// Minimum spacing between app-active requests.
    pub app_active_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl BridgeConfig {
    /// Built-in values, ignoring the environment.
    pub fn builtin() -> Self {
        Self {
            app_id: DEFAULT_APP_ID,
            poll_interval: Duration::from_millis(3000),
            request_timeout: Duration::from_millis(10_000),
            readiness_timeout: Duration::from_millis(30_000),
            reconnect_delay: Duration::from_millis(5000),
            handshake_retry_interval: Duration::from_millis(2000),
            app_active_interval: Duration::from_millis(15_000),
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let builtin = Self::builtin();
        Self {
            app_id: parse_var(&lookup, "GCBRIDGE_APP_ID").unwrap_or(builtin.app_id),
            poll_interval: millis_var(&lookup, "GCBRIDGE_POLL_INTERVAL_MS")
                .unwrap_or(builtin.poll_interval),
            request_timeout: millis_var(&lookup, "GCBRIDGE_REQUEST_TIMEOUT_MS")
                .unwrap_or(builtin.request_timeout),
            readiness_timeout: millis_var(&lookup, "GCBRIDGE_READINESS_TIMEOUT_MS")
                .unwrap_or(builtin.readiness_timeout),
            reconnect_delay: millis_var(&lookup, "GCBRIDGE_RECONNECT_DELAY_MS")
                .unwrap_or(builtin.reconnect_delay),
            ..builtin
        }
        .validated()
    }

    pub fn with_app_id(mut self, app_id: u32) -> Self {
        self.app_id = app_id;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_handshake_retry_interval(mut self, interval: Duration) -> Self {
        self.handshake_retry_interval = interval;
        self
    }

    /// Raise every duration that has a floor up to it.
    pub fn validated(mut self) -> Self {
        self.poll_interval = at_least("poll_interval", self.poll_interval, MIN_POLL_INTERVAL);
        self.request_timeout =
            at_least("request_timeout", self.request_timeout, MIN_REQUEST_TIMEOUT);
        self.readiness_timeout = at_least(
            "readiness_timeout",
            self.readiness_timeout,
            MIN_READINESS_TIMEOUT,
        );
        self.handshake_retry_interval = at_least(
            "handshake_retry_interval",
            self.handshake_retry_interval,
            MIN_HANDSHAKE_RETRY_INTERVAL,
        );
        self.app_active_interval = at_least(
            "app_active_interval",
            self.app_active_interval,
            MIN_APP_ACTIVE_INTERVAL,
        );
        self
    }

    /// Timeout for one request: the task's override if any, else the
    /// default, never below the floor.
    pub fn request_timeout_for(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.request_timeout)
            .max(MIN_REQUEST_TIMEOUT)
    }
}

fn at_least(name: &str, value: Duration, floor: Duration) -> Duration {
    if value < floor {
        tracing::warn!(
            setting = name,
            requested_ms = value.as_millis() as u64,
            floor_ms = floor.as_millis() as u64,
            "Configured value below minimum, using minimum"
        );
        floor
    } else {
        value
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

fn millis_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    parse_var::<u64>(lookup, key).map(Duration::from_millis)
}
