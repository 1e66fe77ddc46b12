use std::net::TcpStream;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::recognition::domain::reconnect_policy::ReconnectPolicy;
use crate::recognition::domain::recognition_transport::{
    RecognitionTransport, TransportError, TransportEvent,
};

/// How long a socket read blocks before the I/O thread checks for
/// outbound messages and shutdown.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// [`RecognitionTransport`] over a WebSocket, driven by a dedicated I/O
/// thread.
///
/// The thread owns the socket: it connects, forwards queued outbound text,
/// reports inbound text as [`TransportEvent::Message`] and reconnects per
/// the [`ReconnectPolicy`] until the budget runs out or the transport is
/// shut down.
pub struct WebSocketTransport {
    outbound_tx: Sender<String>,
    events_rx: Receiver<TransportEvent>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Starts the I/O thread. Connection progress arrives as events.
    pub fn connect(endpoint: &str, policy: ReconnectPolicy) -> Self {
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        let worker = Worker {
            endpoint: endpoint.to_string(),
            policy,
            outbound_rx,
            events_tx,
            stop_rx,
        };
        let handle = std::thread::spawn(move || worker.run());

        Self {
            outbound_tx,
            events_rx,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

impl RecognitionTransport for WebSocketTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound_tx
            .send(text)
            .map_err(|_| TransportError::Closed)
    }

    fn events(&self) -> Receiver<TransportEvent> {
        self.events_rx.clone()
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the worker wherever it is waiting.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("WebSocket I/O thread panicked");
            }
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    endpoint: String,
    policy: ReconnectPolicy,
    outbound_rx: Receiver<String>,
    events_tx: Sender<TransportEvent>,
    stop_rx: Receiver<()>,
}

impl Worker {
    fn run(self) {
        let mut failures: u32 = 0;
        loop {
            if self.stop_requested() {
                return;
            }
            self.discard_stale_outbound();
            self.emit(TransportEvent::Connecting {
                attempt: failures + 1,
            });

            match tungstenite::connect(self.endpoint.as_str()) {
                Ok((mut socket, _)) => {
                    failures = 0;
                    if let Err(e) = set_read_timeout(&socket, READ_POLL_INTERVAL) {
                        log::warn!("Cannot set socket read timeout: {e}");
                    }
                    log::info!("WebSocket connected to {}", self.endpoint);
                    self.emit(TransportEvent::Connected);
                    let reason = self.serve(&mut socket);
                    let _ = socket.close(None);
                    self.emit(TransportEvent::Disconnected { reason });
                }
                Err(e) => {
                    log::debug!("WebSocket connect to {} failed: {e}", self.endpoint);
                    self.emit(TransportEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            }

            failures = failures.saturating_add(1);
            let Some(delay) = self.policy.delay_for(failures) else {
                self.emit(TransportEvent::GaveUp);
                return;
            };
            log::debug!("Reconnecting in {} ms", delay.as_millis());
            match self.stop_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => return,
            }
        }
    }

    /// Pumps one connection until it drops. Returns the reason.
    fn serve(&self, socket: &mut Socket) -> String {
        loop {
            if self.stop_requested() {
                return "shutdown".to_string();
            }
            while let Ok(text) = self.outbound_rx.try_recv() {
                if let Err(e) = socket.send(Message::text(text)) {
                    self.emit(TransportEvent::SendFailed {
                        reason: e.to_string(),
                    });
                    return e.to_string();
                }
            }
            match socket.read() {
                Ok(Message::Text(text)) => self.emit(TransportEvent::Message {
                    text: text.as_str().to_owned(),
                    received_at: Instant::now(),
                }),
                Ok(Message::Close(_)) => return "closed by server".to_string(),
                Ok(Message::Binary(bytes)) => {
                    log::debug!("Ignoring {}-byte binary message", bytes.len());
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => return e.to_string(),
            }
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop_rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Requests queued while disconnected belong to cycles that have
    /// already been failed.
    fn discard_stale_outbound(&self) {
        let stale = self.outbound_rx.try_iter().count();
        if stale > 0 {
            log::debug!("Discarded {stale} requests queued while disconnected");
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}
