//! Processing failures, labelled by pipeline stage.
//!
//! The variant decides nothing by itself (every failure ends with the
//! queue entry marked `failed`), but the stage label ends up in
//! `error_message` and makes triage possible after the fact.

use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("face detection failed: {0}")]
    Detection(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ProcessError {
    pub fn not_found(what: impl Display) -> Self {
        ProcessError::NotFound(what.to_string())
    }

    pub fn storage(cause: impl Display) -> Self {
        ProcessError::Storage(cause.to_string())
    }

    pub fn detection(cause: impl Display) -> Self {
        ProcessError::Detection(cause.to_string())
    }

    pub fn image(cause: impl Display) -> Self {
        ProcessError::Image(cause.to_string())
    }

    pub fn persistence(cause: impl Display) -> Self {
        ProcessError::Persistence(cause.to_string())
    }
}
