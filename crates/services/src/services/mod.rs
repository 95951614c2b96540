pub mod api_client;
pub mod config;
pub mod credential_store;
pub mod notification;
pub mod request_scope;
pub mod review_gate;
pub mod session;
pub mod workshop_api;
