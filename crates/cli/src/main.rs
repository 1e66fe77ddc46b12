use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use facecheck_core::capture::domain::camera::Camera;
use facecheck_core::capture::infrastructure::directory_camera::DirectoryCamera;
use facecheck_core::capture::infrastructure::rotating_camera::{RotatingCamera, Rotation};
use facecheck_core::detection::domain::face_detector::FaceDetector;
use facecheck_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facecheck_core::feedback::infrastructure::log_sound_player::LogSoundPlayer;
use facecheck_core::imaging::domain::image_operator::ImageOperator;
use facecheck_core::imaging::infrastructure::image_crate_operator::ImageCrateOperator;
use facecheck_core::pipeline::detection_scheduler::{
    DetectionScheduler, SchedulerCommand, SchedulerHandle, SchedulerPorts,
};
use facecheck_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facecheck_core::recognition::domain::reconnect_policy::ReconnectPolicy;
use facecheck_core::recognition::infrastructure::websocket_transport::WebSocketTransport;
use facecheck_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use facecheck_core::shared::model_resolver;
use facecheck_core::shared::settings::RecognitionSettings;
use facecheck_core::storage::domain::crop_history::{CropHistory, PreviewStatus};
use facecheck_core::storage::domain::file_storage::FileStorage;
use facecheck_core::storage::infrastructure::local_file_storage::LocalFileStorage;

/// Continuous face detection with remote recognition.
#[derive(Parser)]
#[command(name = "facecheck")]
struct Cli {
    /// Recognition service WebSocket endpoint (overrides the config file).
    #[arg(long)]
    endpoint: Option<String>,

    /// Directory of frames the camera cycles through.
    #[arg(long)]
    frames: PathBuf,

    /// Detector model (.onnx). Downloaded to the cache when omitted.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Settings JSON file. Defaults to the user config location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Display viewport as WIDTHxHEIGHT, e.g. 1080x1920.
    #[arg(long, value_parser = parse_viewport)]
    viewport: Option<(f64, f64)>,

    /// Minimum padded display size of a face before it is submitted.
    #[arg(long)]
    min_face_size: Option<f64>,

    /// Quiet period after each recognition attempt, in milliseconds.
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Where crop previews are written.
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Rotate captured frames clockwise by 0, 90, 180 or 270 degrees
    /// instead of following their EXIF orientation.
    #[arg(long)]
    rotate: Option<u32>,

    /// Send crops unmirrored.
    #[arg(long)]
    no_mirror: bool,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,

    /// Stop automatically after this many seconds.
    #[arg(long)]
    run_for_secs: Option<u64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings = load_settings(&cli)?;
    let preview_dir = settings
        .preview_dir
        .clone()
        .or_else(model_resolver::preview_cache_dir)
        .ok_or("No preview directory available; pass --preview-dir")?;

    let operator: Arc<dyn ImageOperator> = Arc::new(ImageCrateOperator::new(
        settings.output_format,
        settings.output_quality,
    ));
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage);
    let camera = build_camera(&cli, &operator, &storage, &preview_dir)?;
    let detector = build_detector(&cli)?;

    log::info!("Connecting to {}", settings.endpoint);
    let transport = WebSocketTransport::connect(
        &settings.endpoint,
        ReconnectPolicy::from_settings(&settings.reconnect),
    );

    let ports = SchedulerPorts {
        camera,
        detector,
        operator,
        storage,
        transport: Box::new(transport),
        sound: Box::new(LogSoundPlayer::stderr(true)),
        logger: Box::new(StdoutPipelineLogger::new()),
    };
    let mut scheduler = DetectionScheduler::new(ports, &settings, preview_dir);

    spawn_stdin_commands(scheduler.handle());
    if let Some(secs) = cli.run_for_secs {
        spawn_stop_timer(scheduler.handle(), Duration::from_secs(secs));
    }
    eprintln!("Commands: d = detect now, p = pause, r = resume, q = quit");

    scheduler.run();
    print_history(scheduler.history());
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<RecognitionSettings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.config {
        Some(path) => RecognitionSettings::load(path)?,
        None => RecognitionSettings::load_or_default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if let Some(viewport) = cli.viewport {
        settings.viewport = viewport;
    }
    if let Some(size) = cli.min_face_size {
        settings.min_display_face_size = size;
    }
    if let Some(ms) = cli.cooldown_ms {
        settings.cooldown_ms = ms;
    }
    if let Some(dir) = &cli.preview_dir {
        settings.preview_dir = Some(dir.clone());
    }
    if cli.no_mirror {
        settings.mirror = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn build_camera(
    cli: &Cli,
    operator: &Arc<dyn ImageOperator>,
    storage: &Arc<dyn FileStorage>,
    scratch_dir: &std::path::Path,
) -> Result<Box<dyn Camera>, Box<dyn std::error::Error>> {
    let camera = DirectoryCamera::open(&cli.frames)?;
    log::info!(
        "Camera: {} frames from {}",
        camera.len(),
        cli.frames.display()
    );
    let rotation = match cli.rotate {
        Some(degrees) => Rotation::Fixed(degrees),
        None => Rotation::Exif,
    };
    Ok(Box::new(RotatingCamera::new(
        camera,
        rotation,
        operator.clone(),
        storage.clone(),
        scratch_dir,
    )))
}

fn build_detector(cli: &Cli) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        cli.model.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    if cli.model.is_none() {
        eprintln!();
    }
    Ok(Box::new(OnnxYoloDetector::new(&model_path, cli.confidence)?))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.frames.is_dir() {
        return Err(format!("Frames directory not found: {}", cli.frames.display()).into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if let Some(degrees) = cli.rotate {
        if ![0, 90, 180, 270].contains(&degrees) {
            return Err(format!("Rotate must be 0, 90, 180 or 270, got {degrees}").into());
        }
    }
    if let Some(size) = cli.min_face_size {
        if size < 0.0 {
            return Err(format!("Min face size must be non-negative, got {size}").into());
        }
    }
    Ok(())
}

fn parse_viewport(s: &str) -> Result<(f64, f64), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: f64 = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
    let h: f64 = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
    if w <= 0.0 || h <= 0.0 {
        return Err(format!("viewport must be positive, got {w}x{h}"));
    }
    Ok((w, h))
}

fn parse_command(line: &str) -> Option<SchedulerCommand> {
    match line.trim() {
        "d" => Some(SchedulerCommand::TriggerNow),
        "p" => Some(SchedulerCommand::Suspend),
        "r" => Some(SchedulerCommand::Resume),
        "q" => Some(SchedulerCommand::Stop),
        _ => None,
    }
}

/// Forwards stdin commands until EOF or the scheduler stops.
fn spawn_stdin_commands(handle: SchedulerHandle) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    if !handle.send(command) {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("Unknown command '{}'", line.trim()),
            }
        }
    });
}

fn spawn_stop_timer(handle: SchedulerHandle, after: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(after);
        log::info!("Run time of {}s elapsed, stopping", after.as_secs());
        handle.stop();
    });
}

fn print_history(history: &CropHistory) {
    let entries = history.snapshot();
    if entries.is_empty() {
        println!("No faces submitted.");
        return;
    }
    println!("Recent crops (newest first):");
    for entry in entries.iter() {
        let status = match entry.status {
            PreviewStatus::Waiting => "waiting".to_string(),
            PreviewStatus::Recognized => format!(
                "recognized as {}",
                entry.person_name.as_deref().unwrap_or("?")
            ),
            PreviewStatus::NotRecognized => match &entry.error_message {
                Some(error) => format!("not recognized ({error})"),
                None => "not recognized".to_string(),
            },
        };
        let path = entry
            .image_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {}  {status}  {path}", entry.id);
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
