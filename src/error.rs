//! Error types for binaura

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinauraError {
    #[error("Spatial audio backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, BinauraError>;
