pub mod components;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod telemetry;
pub mod types;

pub use config::PalaverServiceConfig;
pub use server::{create_router, run_server, AppState};
