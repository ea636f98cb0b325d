pub mod api_football;
pub mod automation;
pub mod config;
pub mod date_window;
pub mod executor;
pub mod fixture;
pub mod http_client;
pub mod phase;
pub mod refresh;
pub mod store;
pub mod webhook;
