use crate::shared::frame::Frame;

/// Source of still frames for the detection loop.
///
/// A failed capture (device busy, unreadable file) aborts the current
/// cycle only; the loop tries again on the next tick.
pub trait Camera: Send {
    fn capture(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;
}
