//! Core library for the Mentis Anchora companion service.

pub mod care;
pub mod config;
pub mod error;
pub mod telemetry;

pub use error::AppError;
