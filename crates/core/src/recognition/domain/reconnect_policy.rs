use std::time::Duration;

use crate::shared::settings::ReconnectSettings;

/// Bounded exponential backoff between connection attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectPolicy {
    initial: Duration,
    decay: f64,
    max: Duration,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn new(initial: Duration, decay: f64, max: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial,
            decay: decay.max(1.0),
            max: max.max(initial),
            max_attempts,
        }
    }

    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_interval_ms),
            settings.decay,
            Duration::from_millis(settings.max_interval_ms),
            settings.max_attempts,
        )
    }

    /// Delay before reconnect attempt `attempt` (1-based), or `None` once
    /// the attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if attempt > max_attempts {
                return None;
            }
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial.as_secs_f64() * self.decay.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return Some(self.max);
        }
        Some(Duration::from_secs_f64(secs))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}
