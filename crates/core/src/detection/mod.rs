pub mod domain {
    pub mod coordinate_transform;
    pub mod face_detector;
}
pub mod infrastructure;
