//! Utilities - shared infrastructure
//!
//! # Contents
//!
//! - [`AppError`] - application error type
//! - [`logger`] - tracing setup and the dead-letter log
//! - [`validation`] - payload validation helpers

pub mod error;
pub mod logger;
pub mod validation;

pub use error::{AppError, AppResult, ErrorBody};
