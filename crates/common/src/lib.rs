//! Common types and utilities for the frame analysis pipeline

pub mod error;
pub mod model;

pub use error::{PipelineError, Result, Stage};
pub use model::*;
