//! HTTP-backed collaborator clients for the identity and payment providers.
//!
//! Implements the capability traits from [`cercle_core::provider`] over
//! [`reqwest`]. Every request carries a bounded timeout; failures map to
//! [`cercle_core::provider::ProviderError`] with its retryable
//! classification. Webhook verification does NOT live here — inbound
//! deliveries are authenticated by `cercle_core::signature`.

pub mod identity;
pub mod payment;

pub use identity::{IdentityClient, IdentityConfig};
pub use payment::{PaymentClient, PaymentConfig};

/// Map a transport-level failure onto the provider error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> cercle_core::provider::ProviderError {
  use cercle_core::provider::ProviderError;
  if err.is_timeout() {
    ProviderError::Timeout
  } else {
    ProviderError::Transport(err.to_string())
  }
}
