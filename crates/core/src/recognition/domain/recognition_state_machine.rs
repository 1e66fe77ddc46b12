use std::time::{Duration, Instant};

use thiserror::Error;

/// Classified result of one recognition attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionOutcome {
    Recognized { person_name: String },
    NotRecognized,
}

impl RecognitionOutcome {
    pub fn is_recognized(&self) -> bool {
        matches!(self, RecognitionOutcome::Recognized { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionState {
    Idle,
    Processing,
    WaitingForResponse,
    ShowingResult {
        outcome: RecognitionOutcome,
        until: Instant,
    },
}

impl RecognitionState {
    pub fn name(&self) -> &'static str {
        match self {
            RecognitionState::Idle => "idle",
            RecognitionState::Processing => "processing",
            RecognitionState::WaitingForResponse => "waiting_for_response",
            RecognitionState::ShowingResult { .. } => "showing_result",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("cooldown active for another {remaining_ms} ms")]
    CoolingDown { remaining_ms: u128 },
}

/// Durations governing how long results stay visible and how often
/// submissions may happen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecognitionTimings {
    pub cooldown: Duration,
    pub recognized_dwell: Duration,
    pub not_recognized_dwell: Duration,
}

impl Default for RecognitionTimings {
    fn default() -> Self {
        use crate::shared::constants::*;
        Self {
            cooldown: DEFAULT_COOLDOWN,
            recognized_dwell: DEFAULT_RECOGNIZED_DWELL,
            not_recognized_dwell: DEFAULT_NOT_RECOGNIZED_DWELL,
        }
    }
}

/// The single authority on whether a new recognition cycle may start.
///
/// All transitions take the current instant explicitly so behaviour is
/// deterministic under test. Only `Idle` with an elapsed cooldown admits a
/// new cycle; returning to `Idle` from a result or a hard reset starts the
/// cooldown.
pub struct RecognitionStateMachine {
    state: RecognitionState,
    timings: RecognitionTimings,
    cooldown_until: Option<Instant>,
}

impl RecognitionStateMachine {
    pub fn new(timings: RecognitionTimings) -> Self {
        Self {
            state: RecognitionState::Idle,
            timings,
            cooldown_until: None,
        }
    }

    pub fn state(&self) -> &RecognitionState {
        &self.state
    }

    pub fn timings(&self) -> RecognitionTimings {
        self.timings
    }

    pub fn is_idle(&self) -> bool {
        self.state == RecognitionState::Idle
    }

    /// Automatic triggering is disabled from the moment processing starts
    /// until the machine is back in `Idle`.
    pub fn auto_trigger_enabled(&self) -> bool {
        self.is_idle()
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn can_begin(&self, now: Instant) -> bool {
        self.is_idle() && self.cooldown_remaining(now).is_zero()
    }

    /// `Idle` → `Processing`.
    pub fn begin_processing(&mut self, now: Instant) -> Result<(), TransitionError> {
        self.require_state(RecognitionState::Idle, "begin processing")?;
        let remaining = self.cooldown_remaining(now);
        if !remaining.is_zero() {
            return Err(TransitionError::CoolingDown {
                remaining_ms: remaining.as_millis(),
            });
        }
        self.state = RecognitionState::Processing;
        Ok(())
    }

    /// `Processing` → `WaitingForResponse`, once the request is on the wire.
    pub fn await_response(&mut self) -> Result<(), TransitionError> {
        self.require_state(RecognitionState::Processing, "await a response")?;
        self.state = RecognitionState::WaitingForResponse;
        Ok(())
    }

    /// `WaitingForResponse` → `ShowingResult`. Returns the dwell deadline.
    pub fn show_result(
        &mut self,
        outcome: RecognitionOutcome,
        now: Instant,
    ) -> Result<Instant, TransitionError> {
        self.require_state(RecognitionState::WaitingForResponse, "show a result")?;
        let dwell = if outcome.is_recognized() {
            self.timings.recognized_dwell
        } else {
            self.timings.not_recognized_dwell
        };
        let until = now + dwell;
        self.state = RecognitionState::ShowingResult { outcome, until };
        Ok(until)
    }

    /// Advances timers. Returns true when a dwell ended and the machine
    /// went back to `Idle`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            RecognitionState::ShowingResult { until, .. } if now >= until => {
                self.enter_idle(now);
                true
            }
            _ => false,
        }
    }

    /// Any state → `Idle`. Idempotent: resetting an idle machine leaves the
    /// running cooldown untouched.
    pub fn reset(&mut self, now: Instant) {
        if self.is_idle() {
            return;
        }
        log::debug!("Hard reset from {}", self.state.name());
        self.enter_idle(now);
    }

    fn enter_idle(&mut self, now: Instant) {
        self.state = RecognitionState::Idle;
        self.cooldown_until = Some(now + self.timings.cooldown);
    }

    fn require_state(
        &self,
        required: RecognitionState,
        action: &'static str,
    ) -> Result<(), TransitionError> {
        if std::mem::discriminant(&self.state) == std::mem::discriminant(&required) {
            Ok(())
        } else {
            Err(TransitionError::InvalidState {
                action,
                state: self.state.name(),
            })
        }
    }
}

impl Default for RecognitionStateMachine {
    fn default() -> Self {
        Self::new(RecognitionTimings::default())
    }
}
