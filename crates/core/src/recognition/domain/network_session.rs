use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use thiserror::Error;
use uuid::Uuid;

use super::recognition_response::{RecognitionResponse, ResponseClassifier};
use super::recognition_state_machine::RecognitionOutcome;
use super::recognition_transport::{RecognitionTransport, TransportError, TransportEvent};
use crate::shared::constants::{DEFAULT_REQUEST_MARKER, DEFAULT_REQUEST_TERMINATOR};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The single outstanding recognition request.
///
/// The outbound frame carries no request id, so replies are matched by
/// an optional `request_id` echo and otherwise by send order. Replies
/// received before `sent_at` belong to an earlier request and are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub preview_id: Uuid,
    pub sent_at: Instant,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("not connected to the recognition service")]
    NotConnected,
    #[error("a recognition request is already pending")]
    RequestPending,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Wraps an image payload in the service's framed request string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestFraming {
    pub marker: String,
    pub terminator: String,
}

impl RequestFraming {
    pub fn frame(&self, payload: &str) -> String {
        format!(
            "{marker}:check_image:{payload}:{marker}:{terminator}",
            marker = self.marker,
            terminator = self.terminator
        )
    }
}

impl Default for RequestFraming {
    fn default() -> Self {
        Self {
            marker: DEFAULT_REQUEST_MARKER.to_string(),
            terminator: DEFAULT_REQUEST_TERMINATOR.to_string(),
        }
    }
}

/// What the control loop must act on after a transport event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutput {
    /// The pending request was answered.
    Response {
        preview_id: Uuid,
        outcome: RecognitionOutcome,
        round_trip: Duration,
        error: Option<String>,
    },
    /// The pending request can no longer be answered.
    Failed { preview_id: Uuid, reason: String },
    /// The transport stopped for good. Carries the request that was
    /// still pending, if any.
    GaveUp { failed: Option<Uuid> },
}

/// Single-flight request/response correlation over a
/// [`RecognitionTransport`].
///
/// At most one [`PendingRequest`] exists at any time. Replies are matched to
/// it by the optional echoed request id; replies that arrive with nothing
/// pending, or that echo a different id, are discarded as stale.
pub struct NetworkSession {
    transport: Box<dyn RecognitionTransport>,
    classifier: ResponseClassifier,
    framing: RequestFraming,
    response_timeout: Duration,
    state: ConnectionState,
    pending: Option<PendingRequest>,
}

impl NetworkSession {
    pub fn new(
        transport: Box<dyn RecognitionTransport>,
        classifier: ResponseClassifier,
        framing: RequestFraming,
        response_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            classifier,
            framing,
            response_timeout,
            state: ConnectionState::Disconnected,
            pending: None,
        }
    }

    pub fn events(&self) -> Receiver<TransportEvent> {
        self.transport.events()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// Sends `payload` for the preview `preview_id` and records it as the
    /// pending request.
    pub fn send(
        &mut self,
        preview_id: Uuid,
        payload: &str,
        now: Instant,
    ) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if self.pending.is_some() {
            return Err(SessionError::RequestPending);
        }
        self.transport.send(self.framing.frame(payload))?;
        self.pending = Some(PendingRequest {
            preview_id,
            sent_at: now,
        });
        log::debug!("Sent recognition request for preview {preview_id}");
        Ok(())
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Option<SessionOutput> {
        match event {
            TransportEvent::Connecting { attempt } => {
                self.state = ConnectionState::Connecting;
                log::debug!("Connecting to recognition service (attempt {attempt})");
                None
            }
            TransportEvent::Connected => {
                self.state = ConnectionState::Connected;
                log::info!("Connected to recognition service");
                None
            }
            TransportEvent::Disconnected { reason } => {
                self.state = ConnectionState::Disconnected;
                log::warn!("Recognition service disconnected: {reason}");
                self.fail_pending("connection lost")
            }
            TransportEvent::SendFailed { reason } => {
                log::warn!("Recognition request could not be delivered: {reason}");
                self.fail_pending(&format!("send failed: {reason}"))
            }
            TransportEvent::GaveUp => {
                self.state = ConnectionState::Disconnected;
                log::error!("Giving up on the recognition service");
                let failed = self.pending.take().map(|p| p.preview_id);
                Some(SessionOutput::GaveUp { failed })
            }
            TransportEvent::Message { text, received_at } => self.handle_message(&text, received_at),
        }
    }

    fn handle_message(&mut self, text: &str, received_at: Instant) -> Option<SessionOutput> {
        if self.pending.is_some_and(|p| received_at < p.sent_at) {
            log::debug!("Discarding reply received before the pending request was sent");
            return None;
        }
        let response = match self.classifier.parse(text) {
            Ok(Some(response)) => response,
            Ok(None) => {
                log::debug!("Ignoring non-result message");
                return None;
            }
            Err(e) => {
                log::warn!("Malformed recognition response: {e}");
                return self.fail_pending("malformed response");
            }
        };

        let Some(pending) = self.pending else {
            log::debug!("Discarding response with no request pending");
            return None;
        };
        if response.request_id.is_some_and(|id| id != pending.preview_id) {
            log::debug!("Discarding stale response for {:?}", response.request_id);
            return None;
        }
        self.pending = None;

        let RecognitionResponse { outcome, error, .. } = response;
        Some(SessionOutput::Response {
            preview_id: pending.preview_id,
            outcome,
            round_trip: received_at.saturating_duration_since(pending.sent_at),
            error,
        })
    }

    /// Fails the pending request once it has waited longer than the
    /// response timeout.
    pub fn expire(&mut self, now: Instant) -> Option<SessionOutput> {
        let pending = self.pending?;
        if now.saturating_duration_since(pending.sent_at) < self.response_timeout {
            return None;
        }
        log::warn!("Recognition request {} timed out", pending.preview_id);
        self.fail_pending("response timed out")
    }

    /// Drops any pending request. A late reply to it will be discarded.
    pub fn reset(&mut self) -> Option<PendingRequest> {
        self.pending.take()
    }

    pub fn shutdown(&mut self) {
        self.pending = None;
        self.transport.shutdown();
    }

    fn fail_pending(&mut self, reason: &str) -> Option<SessionOutput> {
        self.pending.take().map(|pending| SessionOutput::Failed {
            preview_id: pending.preview_id,
            reason: reason.to_string(),
        })
    }
}
