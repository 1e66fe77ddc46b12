#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sound {
    Recognized,
    NotRecognized,
}

/// Fire-and-forget audible feedback for recognition results.
///
/// Callers log failures and carry on; feedback is never fatal.
pub trait SoundPlayer: Send {
    fn play(&mut self, sound: Sound) -> Result<(), Box<dyn std::error::Error>>;
}
