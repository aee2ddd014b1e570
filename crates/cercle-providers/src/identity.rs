//! Client for the identity-verification provider's REST API.
//!
//! Every request is signed with a timestamped HMAC-SHA256 over
//! `"{ts}{METHOD}{path}{body}"` and carries the app token, the timestamp,
//! and the hex digest as headers, per the provider's app-token scheme.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use cercle_core::provider::{
  AccessToken, ApplicantHandle, IdentityProvider, ProviderError,
};

use crate::transport_error;

type HmacSha256 = Hmac<Sha256>;

/// Connection settings for the identity provider.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
  pub base_url:     String,
  /// App token sent in the `X-App-Token` header.
  pub app_token:    String,
  /// Shared secret used to sign each request.
  pub secret_key:   String,
  pub timeout_secs: u64,
}

impl Default for IdentityConfig {
  fn default() -> Self {
    Self {
      base_url:     "https://api.identity.example".to_string(),
      app_token:    String::new(),
      secret_key:   String::new(),
      timeout_secs: 15,
    }
  }
}

/// Async HTTP client for the identity provider.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct IdentityClient {
  client: reqwest::Client,
  config: IdentityConfig,
}

impl IdentityClient {
  pub fn new(config: IdentityConfig) -> Result<Self, ProviderError> {
    if config.app_token.is_empty() || config.secret_key.is_empty() {
      tracing::warn!("identity provider credentials not configured");
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| ProviderError::Transport(e.to_string()))?;
    Ok(Self { client, config })
  }

  /// Hex HMAC-SHA256 over `"{ts}{METHOD}{path}{body}"`.
  fn sign(&self, ts: i64, method: &str, path: &str, body: &str) -> String {
    // HMAC accepts any key length; new_from_slice cannot fail in practice.
    let Ok(mut mac) =
      HmacSha256::new_from_slice(self.config.secret_key.as_bytes())
    else {
      return String::new();
    };
    mac.update(ts.to_string().as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  async fn post<T: for<'de> Deserialize<'de>>(
    &self,
    path: &str,
    body: Option<serde_json::Value>,
  ) -> Result<T, ProviderError> {
    let ts = Utc::now().timestamp();
    let body_str = body.map(|b| b.to_string()).unwrap_or_default();
    let signature = self.sign(ts, "POST", path, &body_str);
    let url =
      format!("{}{path}", self.config.base_url.trim_end_matches('/'));

    tracing::debug!(%path, "identity provider POST");
    let mut request = self
      .client
      .post(&url)
      .header("X-App-Token", &self.config.app_token)
      .header("X-App-Access-Ts", ts.to_string())
      .header("X-App-Access-Sig", signature)
      .header(reqwest::header::CONTENT_TYPE, "application/json");
    if !body_str.is_empty() {
      request = request.body(body_str);
    }

    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      tracing::warn!(%path, status = status.as_u16(), "identity provider error");
      return Err(ProviderError::Api { status: status.as_u16(), message });
    }

    response
      .json()
      .await
      .map_err(|e| ProviderError::Decode(e.to_string()))
  }
}

#[derive(Debug, Deserialize)]
struct ApplicantResponse {
  id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
  token:   String,
  user_id: String,
}

impl IdentityProvider for IdentityClient {
  async fn create_applicant(
    &self,
    external_user_id: &str,
    level: &str,
  ) -> Result<ApplicantHandle, ProviderError> {
    tracing::info!(%external_user_id, "creating applicant");
    let path = format!("/resources/applicants?levelName={level}");
    let body = serde_json::json!({
      "externalUserId": external_user_id,
      "levelName": level,
    });
    let response: ApplicantResponse = self.post(&path, Some(body)).await?;
    tracing::info!(applicant_id = %response.id, "applicant created");
    Ok(ApplicantHandle { applicant_id: response.id })
  }

  async fn create_access_token(
    &self,
    external_user_id: &str,
    level: &str,
    ttl_secs: u64,
  ) -> Result<AccessToken, ProviderError> {
    tracing::info!(%external_user_id, "minting SDK access token");
    let path = format!(
      "/resources/accessTokens?userId={external_user_id}\
       &levelName={level}&ttlInSecs={ttl_secs}"
    );
    let response: TokenResponse = self.post(&path, None).await?;
    Ok(AccessToken {
      token:            response.token,
      external_user_id: response.user_id,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(secret: &str) -> IdentityClient {
    IdentityClient::new(IdentityConfig {
      secret_key: secret.to_string(),
      app_token: "tok".to_string(),
      ..IdentityConfig::default()
    })
    .unwrap()
  }

  #[test]
  fn signature_is_deterministic() {
    let c = client("secret");
    let a = c.sign(1_700_000_000, "POST", "/resources/applicants", "{}");
    let b = c.sign(1_700_000_000, "POST", "/resources/applicants", "{}");
    assert_eq!(a, b);
    assert_eq!(a.len(), 64, "hex-encoded SHA-256 digest");
  }

  #[test]
  fn signature_covers_every_component() {
    let c = client("secret");
    let base = c.sign(1_700_000_000, "POST", "/p", "body");
    assert_ne!(base, c.sign(1_700_000_001, "POST", "/p", "body"));
    assert_ne!(base, c.sign(1_700_000_000, "GET", "/p", "body"));
    assert_ne!(base, c.sign(1_700_000_000, "POST", "/q", "body"));
    assert_ne!(base, c.sign(1_700_000_000, "POST", "/p", "other"));
    assert_ne!(base, client("other").sign(1_700_000_000, "POST", "/p", "body"));
  }
}
