pub mod detection_scheduler;
pub mod pipeline_logger;
pub mod process_crop_use_case;
