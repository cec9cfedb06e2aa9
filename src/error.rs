// src/error.rs
//! Error taxonomy of the trigger engine.
//!
//! `ValidationError` aborts an activation. `FetchError` is recovered locally by the
//! running loop. Failures while releasing a stream or timer are only logged and
//! never get a type of their own.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid date for {field}: {value:?}")]
    InvalidDate { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("provider error: {0:#}")]
    Provider(anyhow::Error),
    #[error("cursor state unavailable: {0:#}")]
    Cursor(anyhow::Error),
}
