pub mod domain {
    pub mod crop_history;
    pub mod file_storage;
    pub mod preview_sweeper;
}
pub mod infrastructure {
    pub mod local_file_storage;
}
