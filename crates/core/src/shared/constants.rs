use std::time::Duration;

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Control loop period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_VIEWPORT: (f64, f64) = (1080.0, 1920.0);

/// Padding around a detected face, in source-image pixels.
pub const DEFAULT_BOX_PADDING: f64 = 20.0;

/// Padded display size below which a face is considered too far away.
pub const DEFAULT_MIN_DISPLAY_FACE_SIZE: f64 = 120.0;

/// Margin added around the face when cropping, in source-image pixels.
pub const DEFAULT_CROP_MARGIN: f64 = 20.0;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(2000);
pub const DEFAULT_RECOGNIZED_DWELL: Duration = Duration::from_millis(1500);
pub const DEFAULT_NOT_RECOGNIZED_DWELL: Duration = Duration::from_millis(500);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

pub const CROP_HISTORY_CAPACITY: usize = 10;
pub const PREVIEW_RETENTION: Duration = Duration::from_secs(60 * 60);
pub const PREVIEW_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const PREVIEW_FILE_PREFIX: &str = "face_preview_";

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8765";
pub const DEFAULT_REQUEST_MARKER: &str = "frs";
pub const DEFAULT_REQUEST_TERMINATOR: &str = "eof";

/// Identities the recognition service returns for "processed, no match".
pub const NOT_RECOGNIZED_SENTINELS: &[&str] = &["Unknown", "Unknown_done"];
