pub mod domain {
    pub mod sound_player;
}
pub mod infrastructure {
    pub mod log_sound_player;
}
