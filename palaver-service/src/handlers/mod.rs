use crate::error::PalaverServiceError;

pub mod messages;
pub mod users;

pub type Result<T> = std::result::Result<T, PalaverServiceError>;
