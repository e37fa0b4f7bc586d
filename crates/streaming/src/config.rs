use std::time::Duration;

use tracing::warn;

pub const DEFAULT_FAST_PERIOD: Duration = Duration::from_millis(400);
pub const DEFAULT_SLOW_PERIOD: Duration = Duration::from_millis(2000);

/// Shortest period a polling cycle may run at.
pub const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Polling cadence for the synchronizer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Live traffic state.
    pub fast_period: Duration,
    /// Metrics and dashboard summary.
    pub slow_period: Duration,
    /// Fetch settings once when the cycles start.
    pub fetch_settings_on_start: bool,
}

impl SyncConfig {
    pub fn new(fast_period: Duration, slow_period: Duration) -> Self {
        Self {
            fast_period,
            slow_period,
            ..Self::default()
        }
    }

    /// Clamp both periods to [`MIN_PERIOD`].
    pub fn sanitized(self) -> Self {
        let clamp = |name: &str, d: Duration| {
            if d < MIN_PERIOD {
                warn!("{name} period {d:?} is below {MIN_PERIOD:?}; clamping");
                MIN_PERIOD
            } else {
                d
            }
        };
        Self {
            fast_period: clamp("fast", self.fast_period),
            slow_period: clamp("slow", self.slow_period),
            ..self
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fast_period: DEFAULT_FAST_PERIOD,
            slow_period: DEFAULT_SLOW_PERIOD,
            fetch_settings_on_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_cadence() {
        let c = SyncConfig::default();
        assert_eq!(c.fast_period, Duration::from_millis(400));
        assert_eq!(c.slow_period, Duration::from_millis(2000));
        assert!(c.fetch_settings_on_start);
    }

    #[test]
    fn zero_periods_are_clamped() {
        let c = SyncConfig::new(Duration::ZERO, Duration::from_secs(1)).sanitized();
        assert_eq!(c.fast_period, MIN_PERIOD);
        assert_eq!(c.slow_period, Duration::from_secs(1));
    }
}
