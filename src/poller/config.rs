use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PENDING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Delay between refreshes while nothing is in progress.
    pub interval: Duration,
    /// Delay between refreshes while the pending source reports work in progress.
    pub pending_interval: Duration,
    /// Fire the first refresh (and the one after `resume`) without waiting.
    pub immediate: bool,
    /// Start as soon as the poller is attached to the runtime.
    pub auto_start: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            pending_interval: DEFAULT_PENDING_INTERVAL,
            immediate: true,
            auto_start: true,
        }
    }
}

impl PollerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_pending_interval(mut self, interval: Duration) -> Self {
        self.pending_interval = interval;
        self
    }

    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    #[allow(dead_code)]
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

/// Picks the delay for the next wake-up. A zero interval is never used.
pub fn resolve_interval(interval: Duration, pending_interval: Duration, pending: bool) -> Duration {
    let base = if pending { pending_interval } else { interval };
    if base.is_zero() {
        DEFAULT_INTERVAL
    } else {
        base
    }
}

/// Converts a configured millisecond value, falling back to the default
/// interval for anything that is not a positive finite number.
pub fn interval_from_millis(ms: f64) -> Duration {
    if !ms.is_finite() || ms <= 0.0 {
        return DEFAULT_INTERVAL;
    }

    Duration::try_from_secs_f64(ms / 1000.0)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.interval, Duration::from_millis(10_000));
        assert_eq!(config.pending_interval, Duration::from_millis(5_000));
        assert!(config.immediate);
        assert!(config.auto_start);
    }

    #[test]
    fn test_resolve_interval_picks_by_pending() {
        let idle = Duration::from_secs(10);
        let busy = Duration::from_secs(5);
        assert_eq!(resolve_interval(idle, busy, false), idle);
        assert_eq!(resolve_interval(idle, busy, true), busy);
    }

    #[test]
    fn test_resolve_interval_zero_falls_back() {
        assert_eq!(
            resolve_interval(Duration::ZERO, Duration::from_secs(5), false),
            DEFAULT_INTERVAL
        );
        assert_eq!(
            resolve_interval(Duration::from_secs(30), Duration::ZERO, true),
            DEFAULT_INTERVAL
        );
    }

    #[test]
    fn test_interval_from_millis() {
        assert_eq!(interval_from_millis(2500.0), Duration::from_millis(2500));
        assert_eq!(interval_from_millis(0.0), DEFAULT_INTERVAL);
        assert_eq!(interval_from_millis(-100.0), DEFAULT_INTERVAL);
        assert_eq!(interval_from_millis(f64::NAN), DEFAULT_INTERVAL);
        assert_eq!(interval_from_millis(f64::INFINITY), DEFAULT_INTERVAL);
    }

    #[test]
    fn test_interval_from_millis_tiny_value() {
        // Rounds down to zero nanoseconds
        assert_eq!(interval_from_millis(1e-9), DEFAULT_INTERVAL);
    }
}
