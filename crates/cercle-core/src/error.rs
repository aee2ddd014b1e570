//! Error types for `cercle-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed webhook payload: {0}")]
  MalformedPayload(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
