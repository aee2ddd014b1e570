//! Client for the payment provider's REST API.
//!
//! Payment intents are created with a form-encoded POST authenticated by the
//! secret API key as basic-auth username, the provider's native scheme.

use std::time::Duration;

use serde::Deserialize;

use cercle_core::provider::{
  IntentMetadata, PaymentIntentHandle, PaymentProvider, ProviderError,
};

use crate::transport_error;

/// Connection settings for the payment provider.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
  pub base_url:     String,
  /// Secret API key; sent as the basic-auth username.
  pub api_key:      String,
  /// ISO 4217 currency code for all intents.
  pub currency:     String,
  pub timeout_secs: u64,
}

impl Default for PaymentConfig {
  fn default() -> Self {
    Self {
      base_url:     "https://api.payments.example".to_string(),
      api_key:      String::new(),
      currency:     "eur".to_string(),
      timeout_secs: 15,
    }
  }
}

/// Async HTTP client for the payment provider.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct PaymentClient {
  client: reqwest::Client,
  config: PaymentConfig,
}

impl PaymentClient {
  pub fn new(config: PaymentConfig) -> Result<Self, ProviderError> {
    if config.api_key.is_empty() {
      tracing::warn!("payment provider API key not configured");
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| ProviderError::Transport(e.to_string()))?;
    Ok(Self { client, config })
  }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
  id:            String,
  client_secret: String,
}

impl PaymentProvider for PaymentClient {
  async fn create_payment_intent(
    &self,
    amount_minor: i64,
    description: &str,
    metadata: IntentMetadata,
  ) -> Result<PaymentIntentHandle, ProviderError> {
    tracing::info!(amount_minor, "creating payment intent");

    let url = format!(
      "{}/v1/payment_intents",
      self.config.base_url.trim_end_matches('/')
    );
    let form = [
      ("amount", amount_minor.to_string()),
      ("currency", self.config.currency.clone()),
      ("description", description.to_string()),
      ("metadata[circleId]", metadata.circle_id.to_string()),
      ("metadata[userId]", metadata.user_id.to_string()),
      ("automatic_payment_methods[enabled]", "true".to_string()),
    ];

    let response = self
      .client
      .post(&url)
      .basic_auth(&self.config.api_key, Option::<&str>::None)
      .form(&form)
      .send()
      .await
      .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      tracing::warn!(status = status.as_u16(), "payment provider error");
      return Err(ProviderError::Api { status: status.as_u16(), message });
    }

    let intent: IntentResponse = response
      .json()
      .await
      .map_err(|e| ProviderError::Decode(e.to_string()))?;

    tracing::info!(intent_id = %intent.id, "payment intent created");
    Ok(PaymentIntentHandle {
      intent_id:     intent.id,
      client_secret: intent.client_secret,
    })
  }
}
