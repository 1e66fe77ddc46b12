use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::*;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Encoding used for the cropped face before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Jpeg => write!(f, "JPEG"),
            OutputFormat::Png => write!(f, "PNG"),
            OutputFormat::Webp => write!(f, "WEBP"),
        }
    }
}

/// Resize/re-encode policy for the transmitted payload and the preview copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionPolicy {
    pub enabled: bool,
    pub transmit_max: (u32, u32),
    pub transmit_quality: u8,
    pub preview_max: (u32, u32),
    pub preview_quality: u8,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            transmit_max: (480, 480),
            transmit_quality: 80,
            preview_max: (160, 160),
            preview_quality: 70,
        }
    }
}

/// Backoff parameters for the recognition socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_interval_ms: u64,
    pub decay: f64,
    pub max_interval_ms: u64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            decay: 1.5,
            max_interval_ms: 30_000,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub endpoint: String,
    pub tick_interval_ms: u64,
    pub viewport: (f64, f64),
    pub box_padding: f64,
    pub min_display_face_size: f64,
    pub crop_margin: f64,
    pub mirror: bool,
    pub output_format: OutputFormat,
    pub output_quality: u8,
    pub compression: CompressionPolicy,
    pub cooldown_ms: u64,
    pub recognized_dwell_ms: u64,
    pub not_recognized_dwell_ms: u64,
    pub response_timeout_ms: u64,
    pub history_capacity: usize,
    pub preview_dir: Option<PathBuf>,
    pub preview_prefix: String,
    pub preview_retention_secs: u64,
    pub sweep_interval_secs: u64,
    pub request_marker: String,
    pub request_terminator: String,
    pub not_recognized_names: Vec<String>,
    pub reconnect: ReconnectSettings,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            viewport: DEFAULT_VIEWPORT,
            box_padding: DEFAULT_BOX_PADDING,
            min_display_face_size: DEFAULT_MIN_DISPLAY_FACE_SIZE,
            crop_margin: DEFAULT_CROP_MARGIN,
            mirror: true,
            output_format: OutputFormat::Jpeg,
            output_quality: 95,
            compression: CompressionPolicy::default(),
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            recognized_dwell_ms: DEFAULT_RECOGNIZED_DWELL.as_millis() as u64,
            not_recognized_dwell_ms: DEFAULT_NOT_RECOGNIZED_DWELL.as_millis() as u64,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            history_capacity: CROP_HISTORY_CAPACITY,
            preview_dir: None,
            preview_prefix: PREVIEW_FILE_PREFIX.to_string(),
            preview_retention_secs: PREVIEW_RETENTION.as_secs(),
            sweep_interval_secs: PREVIEW_SWEEP_INTERVAL.as_secs(),
            request_marker: DEFAULT_REQUEST_MARKER.to_string(),
            request_terminator: DEFAULT_REQUEST_TERMINATOR.to_string(),
            not_recognized_names: NOT_RECOGNIZED_SENTINELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl RecognitionSettings {
    /// `<config dir>/FaceCheck/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceCheck").join("settings.json"))
    }

    /// Reads settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads from the default location, falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring settings file: {e}");
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let (vw, vh) = self.viewport;
        if vw <= 0.0 || vh <= 0.0 {
            return Err(SettingsError::Invalid(format!(
                "viewport must be positive, got {vw}x{vh}"
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(SettingsError::Invalid("tick interval must be > 0".into()));
        }
        if self.history_capacity == 0 {
            return Err(SettingsError::Invalid("history capacity must be > 0".into()));
        }
        if self.response_timeout_ms == 0 {
            return Err(SettingsError::Invalid("response timeout must be > 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(SettingsError::Invalid("sweep interval must be > 0".into()));
        }
        for (name, q) in [
            ("output quality", self.output_quality),
            ("transmit quality", self.compression.transmit_quality),
            ("preview quality", self.compression.preview_quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(SettingsError::Invalid(format!(
                    "{name} must be between 1 and 100, got {q}"
                )));
            }
        }
        if self.reconnect.decay < 1.0 {
            return Err(SettingsError::Invalid(format!(
                "reconnect decay must be >= 1.0, got {}",
                self.reconnect.decay
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn recognized_dwell(&self) -> Duration {
        Duration::from_millis(self.recognized_dwell_ms)
    }

    pub fn not_recognized_dwell(&self) -> Duration {
        Duration::from_millis(self.not_recognized_dwell_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn preview_retention(&self) -> Duration {
        Duration::from_secs(self.preview_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RecognitionSettings::default().validate().is_ok());
    }

    #[test]
    fn test_default_timings() {
        let s = RecognitionSettings::default();
        assert_eq!(s.tick_interval(), Duration::from_millis(50));
        assert_eq!(s.cooldown(), Duration::from_millis(2000));
        assert_eq!(s.recognized_dwell(), Duration::from_millis(1500));
        assert_eq!(s.not_recognized_dwell(), Duration::from_millis(500));
        assert_eq!(s.preview_retention(), Duration::from_secs(3600));
        assert_eq!(s.sweep_interval(), Duration::from_secs(1800));
        assert_eq!(s.history_capacity, 10);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"endpoint": "ws://10.0.0.2:9000", "compression": {"enabled": false}}"#,
        )
        .unwrap();

        let s = RecognitionSettings::load(&path).unwrap();

        assert_eq!(s.endpoint, "ws://10.0.0.2:9000");
        assert!(!s.compression.enabled);
        assert_eq!(s.compression.transmit_max, (480, 480));
        assert_eq!(s.cooldown_ms, 2000);
    }

    #[test]
    fn test_output_format_lowercase_in_json() {
        let json = serde_json::to_string(&OutputFormat::Webp).unwrap();
        assert_eq!(json, "\"webp\"");
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            RecognitionSettings::load(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RecognitionSettings::load(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(SettingsError::Read { .. })));
    }

    #[rstest]
    #[case::zero_viewport(|s: &mut RecognitionSettings| s.viewport = (0.0, 100.0))]
    #[case::zero_tick(|s: &mut RecognitionSettings| s.tick_interval_ms = 0)]
    #[case::zero_capacity(|s: &mut RecognitionSettings| s.history_capacity = 0)]
    #[case::zero_response_timeout(|s: &mut RecognitionSettings| s.response_timeout_ms = 0)]
    #[case::zero_sweep_interval(|s: &mut RecognitionSettings| s.sweep_interval_secs = 0)]
    #[case::quality_too_high(|s: &mut RecognitionSettings| s.output_quality = 101)]
    #[case::zero_quality(|s: &mut RecognitionSettings| s.compression.preview_quality = 0)]
    #[case::shrinking_backoff(|s: &mut RecognitionSettings| s.reconnect.decay = 0.5)]
    fn test_validate_rejects(#[case] mutate: fn(&mut RecognitionSettings)) {
        let mut s = RecognitionSettings::default();
        mutate(&mut s);
        assert!(matches!(s.validate(), Err(SettingsError::Invalid(_))));
    }
}
