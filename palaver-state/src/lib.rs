pub mod config;
pub mod state_manager;
pub mod types;

pub use sqlx::{self, SqlitePool};
pub use state_manager::{ChatSession, PalaverState, PalaverStateError};
