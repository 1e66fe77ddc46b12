pub mod domain {
    pub mod image_operator;
}
pub mod infrastructure {
    pub mod image_crate_operator;
}
