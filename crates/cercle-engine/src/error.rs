//! Error types for `cercle-engine`.

use cercle_core::provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The webhook signature did not verify. Terminal: never retried here.
  #[error("invalid webhook signature")]
  InvalidSignature,

  #[error(transparent)]
  Malformed(#[from] cercle_core::Error),

  #[error(
    "amount {amount_minor} outside allowed range \
     {min_minor}..={max_minor} minor units"
  )]
  AmountOutOfBounds {
    amount_minor: i64,
    min_minor:    i64,
    max_minor:    i64,
  },

  #[error("provider error: {0}")]
  Provider(#[from] ProviderError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  /// Whether the caller may safely retry the operation.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Provider(e) if e.is_retryable())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
