//! Common types and utilities shared across the crate.

pub mod error;
pub mod ids;

pub use error::{sanitize_error_message, AppError};
pub use ids::new_id;
