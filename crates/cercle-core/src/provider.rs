//! Capability interfaces for the external identity and payment providers.
//!
//! The engine consumes these narrow traits; the `cercle-providers` crate
//! supplies HTTP-backed implementations. Trait methods return `Send` futures
//! so implementations work in multi-threaded async runtimes.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Results ─────────────────────────────────────────────────────────────────

/// A newly-created (or pre-existing) applicant at the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicantHandle {
  pub applicant_id: String,
}

/// A short-lived SDK access token minted for one applicant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
  pub token:            String,
  pub external_user_id: String,
}

/// A newly-created payment intent at the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentHandle {
  pub intent_id:     String,
  /// Handed to the mobile client to confirm the payment.
  pub client_secret: String,
}

/// Metadata attached to a payment intent for later correlation.
#[derive(Debug, Clone, Copy)]
pub struct IntentMetadata {
  pub circle_id: Uuid,
  pub user_id:   Uuid,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Failure talking to an external provider during an initiation flow.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
  #[error("provider request timed out")]
  Timeout,

  #[error("provider returned {status}: {message}")]
  Api { status: u16, message: String },

  #[error("transport error: {0}")]
  Transport(String),

  #[error("could not decode provider response: {0}")]
  Decode(String),
}

impl ProviderError {
  /// Whether the caller may safely retry the initiation call. Initiation is
  /// idempotent on "applicant id already exists", so timeouts and transient
  /// transport/server failures are retryable.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Timeout | Self::Transport(_) => true,
      Self::Api { status, .. } => *status >= 500,
      Self::Decode(_) => false,
    }
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// The identity-verification provider: applicant creation and SDK-token
/// minting. Internal HTTP/retry mechanics live behind this seam.
pub trait IdentityProvider: Send + Sync {
  /// Create an applicant for `external_user_id` at the given review level.
  fn create_applicant<'a>(
    &'a self,
    external_user_id: &'a str,
    level: &'a str,
  ) -> impl Future<Output = Result<ApplicantHandle, ProviderError>> + Send + 'a;

  /// Mint a short-lived SDK access token for `external_user_id`.
  fn create_access_token<'a>(
    &'a self,
    external_user_id: &'a str,
    level: &'a str,
    ttl_secs: u64,
  ) -> impl Future<Output = Result<AccessToken, ProviderError>> + Send + 'a;
}

/// The payment provider: payment-intent creation.
pub trait PaymentProvider: Send + Sync {
  /// Create a payment intent for `amount_minor` minor currency units.
  fn create_payment_intent<'a>(
    &'a self,
    amount_minor: i64,
    description: &'a str,
    metadata: IntentMetadata,
  ) -> impl Future<Output = Result<PaymentIntentHandle, ProviderError>> + Send + 'a;
}
