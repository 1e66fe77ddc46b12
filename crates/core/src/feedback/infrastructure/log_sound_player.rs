use std::io::Write;

use crate::feedback::domain::sound_player::{Sound, SoundPlayer};

/// Terminal feedback: rings the bell (once for a match, twice otherwise)
/// and logs the result.
pub struct LogSoundPlayer<W: Write + Send> {
    out: W,
    bell: bool,
}

impl LogSoundPlayer<std::io::Stderr> {
    pub fn stderr(bell: bool) -> Self {
        Self::new(std::io::stderr(), bell)
    }
}

impl<W: Write + Send> LogSoundPlayer<W> {
    pub fn new(out: W, bell: bool) -> Self {
        Self { out, bell }
    }
}

impl<W: Write + Send> SoundPlayer for LogSoundPlayer<W> {
    fn play(&mut self, sound: Sound) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Feedback: {sound:?}");
        if !self.bell {
            return Ok(());
        }
        let rings: &[u8] = match sound {
            Sound::Recognized => b"\x07",
            Sound::NotRecognized => b"\x07\x07",
        };
        self.out.write_all(rings)?;
        self.out.flush()?;
        Ok(())
    }
}
