use std::time::Instant;

use crossbeam_channel::Receiver;
use thiserror::Error;

/// Connection lifecycle and inbound traffic reported by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connecting { attempt: u32 },
    Connected,
    Disconnected { reason: String },
    /// `received_at` is stamped when the message came off the socket, not
    /// when the control loop got around to reading it.
    Message { text: String, received_at: Instant },
    SendFailed { reason: String },
    /// Reconnect budget exhausted; no further events will follow.
    GaveUp,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport has shut down")]
    Closed,
}

/// Persistent message channel to the recognition service.
///
/// Sends are queued; delivery failures arrive later as
/// [`TransportEvent::SendFailed`].
pub trait RecognitionTransport: Send {
    fn send(&self, text: String) -> Result<(), TransportError>;

    fn events(&self) -> Receiver<TransportEvent>;

    /// Closes the connection and stops reconnecting. Idempotent.
    fn shutdown(&mut self);
}
