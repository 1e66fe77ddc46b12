pub mod domain {
    pub mod camera;
}
pub mod infrastructure {
    pub mod directory_camera;
    pub mod rotating_camera;
}
