pub mod domain {
    pub mod network_session;
    pub mod recognition_response;
    pub mod recognition_state_machine;
    pub mod recognition_transport;
    pub mod reconnect_policy;
}
pub mod infrastructure {
    pub mod websocket_transport;
}
