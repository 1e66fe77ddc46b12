use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use base64::prelude::{Engine, BASE64_STANDARD};
use thiserror::Error;
use uuid::Uuid;

use crate::detection::domain::coordinate_transform::{crop_region, mirror_box, select_largest_face};
use crate::imaging::domain::image_operator::{encoded_extension, FlipAxis, ImageOperator};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;
use crate::shared::settings::CompressionPolicy;
use crate::storage::domain::crop_history::{CropHistory, CropPreview};
use crate::storage::domain::file_storage::FileStorage;

/// Failures of required stages. Optional stages fall back instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no face to crop")]
    NoFace,
    #[error("failed to read frame {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },
    #[error("mirror flip failed: {0}")]
    Flip(String),
}

#[derive(Clone, Debug)]
pub struct CropConfig {
    pub mirror: bool,
    pub crop_margin: f64,
    pub compression: CompressionPolicy,
    pub preview_dir: PathBuf,
    pub preview_prefix: String,
}

/// A failed crop, with the timings of the stages that ran before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CropFailure {
    pub error: PipelineError,
    pub timings: StageTimings,
}

/// Per-stage wall-clock durations of one crop. Each stage is the gap
/// between consecutive checkpoints and is `None` when the stage never ran.
/// `total` spans the first checkpoint to the last, so it always covers the
/// stages, including on failure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StageTimings {
    pub read: Option<Duration>,
    pub flip: Option<Duration>,
    pub crop: Option<Duration>,
    pub compress: Option<Duration>,
    pub persist: Option<Duration>,
    pub total: Duration,
}

impl StageTimings {
    pub fn stages_sum(&self) -> Duration {
        [self.read, self.flip, self.crop, self.compress, self.persist]
            .into_iter()
            .flatten()
            .sum()
    }

    /// Reports the stages that ran, then `total`.
    pub fn report(&self, logger: &mut dyn PipelineLogger) {
        for (stage, duration) in [
            ("read", self.read),
            ("flip", self.flip),
            ("crop", self.crop),
            ("compress", self.compress),
            ("persist", self.persist),
        ] {
            if let Some(duration) = duration {
                logger.timing(stage, duration.as_secs_f64() * 1000.0);
            }
        }
        logger.timing("total", self.total.as_secs_f64() * 1000.0);
    }
}

/// Output of a successful crop: the preview now waiting in the history
/// and the base64 payload to submit.
#[derive(Clone, Debug)]
pub struct CropSubmission {
    pub preview: CropPreview,
    pub payload: String,
    pub timings: StageTimings,
    /// True when the crop failed and the full frame was used instead.
    pub used_full_frame: bool,
}

struct CropOutput {
    preview: CropPreview,
    payload: String,
    used_full_frame: bool,
}

struct Checkpoints {
    start: Instant,
    last: Instant,
}

impl Checkpoints {
    fn start() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
        }
    }

    fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let lap = now - self.last;
        self.last = now;
        lap
    }

    fn total(&self) -> Duration {
        Instant::now() - self.start
    }
}

/// Read → mirror → crop → compress → persist → register, for one
/// accepted detection cycle.
pub struct ProcessCropUseCase {
    operator: Arc<dyn ImageOperator>,
    storage: Arc<dyn FileStorage>,
    history: Arc<CropHistory>,
    config: CropConfig,
}

impl ProcessCropUseCase {
    pub fn new(
        operator: Arc<dyn ImageOperator>,
        storage: Arc<dyn FileStorage>,
        history: Arc<CropHistory>,
        config: CropConfig,
    ) -> Self {
        Self {
            operator,
            storage,
            history,
            config,
        }
    }

    pub fn history(&self) -> &Arc<CropHistory> {
        &self.history
    }

    pub fn execute(
        &self,
        frame: &Frame,
        faces: &[FaceBox],
        created_at: SystemTime,
    ) -> Result<CropSubmission, CropFailure> {
        let mut clock = Checkpoints::start();
        let mut timings = StageTimings::default();
        let result = self.run(frame, faces, created_at, &mut clock, &mut timings);
        timings.total = clock.total();

        match result {
            Ok(output) => Ok(CropSubmission {
                preview: output.preview,
                payload: output.payload,
                timings,
                used_full_frame: output.used_full_frame,
            }),
            Err(error) => Err(CropFailure { error, timings }),
        }
    }

    fn run(
        &self,
        frame: &Frame,
        faces: &[FaceBox],
        created_at: SystemTime,
        clock: &mut Checkpoints,
        timings: &mut StageTimings,
    ) -> Result<CropOutput, PipelineError> {
        let face = select_largest_face(faces).ok_or(PipelineError::NoFace)?;

        let read = self.storage.read_file(frame.path());
        timings.read = Some(clock.lap());
        let bytes = read.map_err(|e| PipelineError::Read {
            path: frame.path().to_path_buf(),
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(PipelineError::Read {
                path: frame.path().to_path_buf(),
                reason: "file is empty".into(),
            });
        }

        let (source, face) = if self.config.mirror {
            let flipped = self.operator.flip(&bytes, FlipAxis::Horizontal);
            timings.flip = Some(clock.lap());
            let flipped = flipped.map_err(|e| PipelineError::Flip(e.to_string()))?;
            if flipped.is_empty() {
                return Err(PipelineError::Flip("operator returned no data".into()));
            }
            (flipped, mirror_box(&face, frame.width() as f64))
        } else {
            timings.flip = Some(clock.lap());
            (bytes, face)
        };

        let cropped = crop_region(&face, self.config.crop_margin, frame.width(), frame.height())
            .ok_or_else(|| "face lies outside the frame".to_string())
            .and_then(|region| {
                self.operator
                    .crop(&source, region)
                    .map_err(|e| e.to_string())
            });
        let (crop, used_full_frame) = match cropped {
            Ok(crop) => (crop, false),
            Err(reason) => {
                log::warn!("Crop failed, submitting full frame: {reason}");
                (source, true)
            }
        };
        timings.crop = Some(clock.lap());

        let policy = &self.config.compression;
        let (transmit, preview_bytes) = if policy.enabled {
            (
                self.compress_or_keep(&crop, policy.transmit_max, policy.transmit_quality),
                self.compress_or_keep(&crop, policy.preview_max, policy.preview_quality),
            )
        } else {
            (crop.clone(), crop)
        };
        timings.compress = Some(clock.lap());

        let id = Uuid::new_v4();
        let path = self.config.preview_dir.join(format!(
            "{}{id}.{}",
            self.config.preview_prefix,
            encoded_extension(&preview_bytes)
        ));
        let image_path = match self.storage.write_file(&path, &preview_bytes) {
            Ok(()) => Some(path),
            Err(e) => {
                log::warn!("Failed to persist preview {}: {e}", path.display());
                None
            }
        };
        timings.persist = Some(clock.lap());

        let preview = CropPreview::waiting(id, image_path, created_at);
        self.history.append(preview.clone());

        Ok(CropOutput {
            preview,
            payload: BASE64_STANDARD.encode(&transmit),
            used_full_frame,
        })
    }

    fn compress_or_keep(&self, crop: &[u8], max: (u32, u32), quality: u8) -> Vec<u8> {
        match self.operator.compress(crop, max.0, max.1, quality) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                log::warn!("Compression returned no data, keeping crop");
                crop.to_vec()
            }
            Err(e) => {
                log::warn!("Compression failed, keeping crop: {e}");
                crop.to_vec()
            }
        }
    }
}
