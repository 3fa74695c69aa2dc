//! Errors surfaced by the client entry point.

use thiserror::Error;

use crate::domain::ApiError;

/// Startup failures of the client binary
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to build REST client: {0}")]
    Api(#[from] ApiError),
}
