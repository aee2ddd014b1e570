//! HTTP surface for the Cercle backend.
//!
//! Exposes an axum [`Router`] over any [`SubjectStore`] plus the two
//! provider collaborators. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/kyc/start` | Start or resume identity verification |
//! | `GET`  | `/kyc/status` | Verification status projection |
//! | `POST` | `/circles/{circle_id}/payments` | Create a contribution payment |
//! | `GET`  | `/payments/{payment_id}/status` | Payment status projection |
//! | `POST` | `/webhooks/identity` | Identity-provider deliveries |
//! | `POST` | `/webhooks/payment` | Payment-provider deliveries |
//! | `GET`  | `/metrics` | Prometheus text exposition |
//! | `GET`  | `/healthz` | Liveness |

pub mod error;
pub mod ops;
pub mod payments;
pub mod verification;
pub mod webhooks;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use cercle_core::{
  provider::{IdentityProvider, PaymentProvider},
  signature::SignatureVerificationMode,
  store::SubjectStore,
};
use cercle_engine::{
  lifecycle::Lifecycle, metrics::Metrics, notify::Notifier,
  reconcile::Reconciler,
};

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `CERCLE_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub identity:   IdentitySettings,
  pub payment:    PaymentSettings,
}

/// Identity-provider settings: outbound API credentials plus inbound webhook
/// authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
  pub base_url:       String,
  pub app_token:      String,
  pub secret_key:     String,
  pub webhook_secret: String,
  /// Explicit switch; defaults to enforced so a deployment can never bypass
  /// signature checks by omission.
  #[serde(default)]
  pub signature_mode: SignatureVerificationMode,
  #[serde(default = "default_level_name")]
  pub level_name:     String,
  #[serde(default = "default_token_ttl")]
  pub token_ttl_secs: u64,
}

/// Payment-provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSettings {
  pub base_url:         String,
  pub api_key:          String,
  pub webhook_secret:   String,
  #[serde(default)]
  pub signature_mode:   SignatureVerificationMode,
  #[serde(default = "default_currency")]
  pub currency:         String,
  #[serde(default = "default_min_amount")]
  pub min_amount_minor: i64,
  #[serde(default = "default_max_amount")]
  pub max_amount_minor: i64,
}

fn default_level_name() -> String { "basic-kyc-level".to_string() }
fn default_token_ttl() -> u64 { 600 }
fn default_currency() -> String { "eur".to_string() }
fn default_min_amount() -> i64 { 500 }
fn default_max_amount() -> i64 { 50_000 }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, I, P, N> {
  pub reconciler: Arc<Reconciler<S, N>>,
  pub lifecycle:  Arc<Lifecycle<S, I, P>>,
  pub metrics:    Arc<Metrics>,
}

impl<S, I, P, N> Clone for AppState<S, I, P, N> {
  fn clone(&self) -> Self {
    Self {
      reconciler: self.reconciler.clone(),
      lifecycle:  self.lifecycle.clone(),
      metrics:    self.metrics.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the Cercle backend.
pub fn router<S, I, P, N>(state: AppState<S, I, P, N>) -> Router
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  Router::new()
    // Client-facing
    .route("/kyc/start", post(verification::start::<S, I, P, N>))
    .route("/kyc/status", get(verification::status::<S, I, P, N>))
    .route(
      "/circles/{circle_id}/payments",
      post(payments::create::<S, I, P, N>),
    )
    .route(
      "/payments/{payment_id}/status",
      get(payments::status::<S, I, P, N>),
    )
    // Provider-facing
    .route("/webhooks/identity", post(webhooks::identity::<S, I, P, N>))
    .route("/webhooks/payment", post(webhooks::payment::<S, I, P, N>))
    // Operational
    .route("/metrics", get(ops::metrics::<S, I, P, N>))
    .route("/healthz", get(ops::healthz))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use cercle_core::{
    provider::{
      AccessToken, ApplicantHandle, IntentMetadata, PaymentIntentHandle,
      ProviderError,
    },
    signature::{SignatureScheme, WebhookVerifier},
  };
  use cercle_engine::{lifecycle::LifecycleConfig, notify::LogNotifier};
  use cercle_store_sqlite::SqliteStore;
  use hmac::{Hmac, Mac};
  use sha2::Sha256;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  const IDENTITY_SECRET: &str = "id-webhook-secret";
  const PAYMENT_SECRET: &str = "pay-webhook-secret";

  // ── Stub providers ──────────────────────────────────────────────────────

  struct StubIdentity;

  impl IdentityProvider for StubIdentity {
    async fn create_applicant(
      &self,
      external_user_id: &str,
      _level: &str,
    ) -> Result<ApplicantHandle, ProviderError> {
      Ok(ApplicantHandle { applicant_id: format!("app-{external_user_id}") })
    }

    async fn create_access_token(
      &self,
      external_user_id: &str,
      _level: &str,
      _ttl_secs: u64,
    ) -> Result<AccessToken, ProviderError> {
      Ok(AccessToken {
        token:            "tok-1".to_string(),
        external_user_id: external_user_id.to_string(),
      })
    }
  }

  #[derive(Default)]
  struct StubPayments {
    intent_calls: Mutex<u32>,
  }

  impl PaymentProvider for StubPayments {
    async fn create_payment_intent(
      &self,
      _amount_minor: i64,
      _description: &str,
      _metadata: IntentMetadata,
    ) -> Result<PaymentIntentHandle, ProviderError> {
      let mut calls = self.intent_calls.lock().unwrap();
      *calls += 1;
      Ok(PaymentIntentHandle {
        intent_id:     format!("pi-{calls}"),
        client_secret: format!("pi-{calls}_secret"),
      })
    }
  }

  type TestState = AppState<SqliteStore, StubIdentity, StubPayments, LogNotifier>;

  async fn make_state() -> TestState {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let metrics = Arc::new(Metrics::new());

    let reconciler = Arc::new(Reconciler::new(
      store.clone(),
      Arc::new(LogNotifier),
      metrics.clone(),
      WebhookVerifier::new(
        IDENTITY_SECRET,
        SignatureScheme::HexDigest,
        SignatureVerificationMode::Enforced,
      ),
      WebhookVerifier::new(
        PAYMENT_SECRET,
        SignatureScheme::Stamped,
        SignatureVerificationMode::Enforced,
      ),
    ));
    let lifecycle = Arc::new(Lifecycle::new(
      store,
      Arc::new(StubIdentity),
      Arc::new(StubPayments::default()),
      metrics.clone(),
      LifecycleConfig::default(),
    ));

    AppState { reconciler, lifecycle, metrics }
  }

  fn sign_hex(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
  }

  fn sign_stamped(body: &[u8], secret: &str) -> String {
    let ts = "1704067200";
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
  }

  async fn oneshot_raw(
    state:   TestState,
    method:  &str,
    uri:     &str,
    headers: Vec<(&str, &str)>,
    body:    &str,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  // ── Liveness ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn healthz_returns_ok() {
    let state = make_state().await;
    let resp = oneshot_raw(state, "GET", "/healthz", vec![], "").await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  // ── Verification endpoints ──────────────────────────────────────────────

  #[tokio::test]
  async fn start_verification_returns_token_and_pending_status() {
    let state = make_state().await;
    let user_id = Uuid::new_v4();

    let resp = oneshot_raw(
      state,
      "POST",
      &format!("/kyc/start?user_id={user_id}"),
      vec![],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["applicant_id"], format!("app-{user_id}"));
    assert_eq!(body["token"], "tok-1");
    assert_eq!(body["status"], "pending");
  }

  #[tokio::test]
  async fn status_for_unknown_user_reports_none() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state,
      "GET",
      &format!("/kyc/status?user_id={}", Uuid::new_v4()),
      vec![],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["status"], "none");
    assert!(body["applicant_id"].is_null());
  }

  #[tokio::test]
  async fn identity_webhook_approves_and_status_reflects_it() {
    let state = make_state().await;
    let user_id = Uuid::new_v4();

    oneshot_raw(
      state.clone(),
      "POST",
      &format!("/kyc/start?user_id={user_id}"),
      vec![],
      "",
    )
    .await;

    let webhook = serde_json::json!({
      "applicantId": format!("app-{user_id}"),
      "correlationId": "c1",
      "reviewStatus": "completed",
      "reviewResult": { "reviewAnswer": "GREEN" }
    })
    .to_string();
    let signature = sign_hex(webhook.as_bytes(), IDENTITY_SECRET);

    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/webhooks/identity",
      vec![("x-payload-digest", signature.as_str())],
      &webhook,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["success"], true);

    let status = oneshot_raw(
      state,
      "GET",
      &format!("/kyc/status?user_id={user_id}"),
      vec![],
      "",
    )
    .await;
    assert_eq!(json_body(status).await["status"], "approved");
  }

  #[tokio::test]
  async fn identity_webhook_with_bad_signature_is_a_400() {
    let state = make_state().await;

    let webhook = serde_json::json!({
      "applicantId": "app-1",
      "reviewResult": { "reviewAnswer": "GREEN" }
    })
    .to_string();

    let resp = oneshot_raw(
      state,
      "POST",
      "/webhooks/identity",
      vec![("x-payload-digest", "deadbeef")],
      &webhook,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn identity_webhook_without_signature_header_is_a_400() {
    let state = make_state().await;
    let webhook = serde_json::json!({ "applicantId": "app-1" }).to_string();

    let resp =
      oneshot_raw(state, "POST", "/webhooks/identity", vec![], &webhook).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn malformed_identity_payload_is_a_400() {
    let state = make_state().await;
    let body = "{not json";
    let signature = sign_hex(body.as_bytes(), IDENTITY_SECRET);

    let resp = oneshot_raw(
      state,
      "POST",
      "/webhooks/identity",
      vec![("x-payload-digest", signature.as_str())],
      body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn duplicate_and_unknown_subject_deliveries_are_still_success() {
    let state = make_state().await;
    let user_id = Uuid::new_v4();
    oneshot_raw(
      state.clone(),
      "POST",
      &format!("/kyc/start?user_id={user_id}"),
      vec![],
      "",
    )
    .await;

    let webhook = serde_json::json!({
      "applicantId": format!("app-{user_id}"),
      "correlationId": "c1",
      "reviewResult": { "reviewAnswer": "GREEN" }
    })
    .to_string();
    let signature = sign_hex(webhook.as_bytes(), IDENTITY_SECRET);

    for _ in 0..2 {
      let resp = oneshot_raw(
        state.clone(),
        "POST",
        "/webhooks/identity",
        vec![("x-payload-digest", signature.as_str())],
        &webhook,
      )
      .await;
      assert_eq!(resp.status(), StatusCode::OK);
    }

    // A subject this system never created: acknowledged, nothing stored.
    let unknown = serde_json::json!({
      "applicantId": "unknown-999",
      "correlationId": "c2",
      "reviewResult": { "reviewAnswer": "GREEN" }
    })
    .to_string();
    let unknown_sig = sign_hex(unknown.as_bytes(), IDENTITY_SECRET);
    let resp = oneshot_raw(
      state,
      "POST",
      "/webhooks/identity",
      vec![("x-payload-digest", unknown_sig.as_str())],
      &unknown,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  // ── Payment endpoints ───────────────────────────────────────────────────

  #[tokio::test]
  async fn create_payment_returns_201_with_client_secret() {
    let state = make_state().await;
    let circle_id = Uuid::new_v4();
    let body = serde_json::json!({
      "user_id": Uuid::new_v4(),
      "amount_minor": 5000,
    })
    .to_string();

    let resp = oneshot_raw(
      state,
      "POST",
      &format!("/circles/{circle_id}/payments"),
      vec![(header::CONTENT_TYPE.as_str(), "application/json")],
      &body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body = json_body(resp).await;
    assert_eq!(body["client_secret"], "pi-1_secret");
    assert!(body["payment_id"].is_string());
  }

  #[tokio::test]
  async fn payment_below_minimum_is_rejected_with_400() {
    let state = make_state().await;
    let body = serde_json::json!({
      "user_id": Uuid::new_v4(),
      "amount_minor": 300,
    })
    .to_string();

    let resp = oneshot_raw(
      state,
      "POST",
      &format!("/circles/{}/payments", Uuid::new_v4()),
      vec![(header::CONTENT_TYPE.as_str(), "application/json")],
      &body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_body(resp).await;
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.contains("amount"), "error: {message}");
  }

  #[tokio::test]
  async fn payment_webhook_settles_the_payment() {
    let state = make_state().await;
    let (circle_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());

    let create = oneshot_raw(
      state.clone(),
      "POST",
      &format!("/circles/{circle_id}/payments"),
      vec![(header::CONTENT_TYPE.as_str(), "application/json")],
      &serde_json::json!({ "user_id": user_id, "amount_minor": 5000 })
        .to_string(),
    )
    .await;
    let payment_id = json_body(create).await["payment_id"]
      .as_str()
      .unwrap()
      .to_string();

    let webhook = serde_json::json!({
      "id": "evt_1",
      "type": "payment_intent.succeeded",
      "data": { "object": { "id": "pi-1", "status": "succeeded", "amount": 5000 } }
    })
    .to_string();
    let signature = sign_stamped(webhook.as_bytes(), PAYMENT_SECRET);

    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/webhooks/payment",
      vec![("x-payment-signature", signature.as_str())],
      &webhook,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let status = oneshot_raw(
      state,
      "GET",
      &format!("/payments/{payment_id}/status?user_id={user_id}"),
      vec![],
      "",
    )
    .await;
    assert_eq!(json_body(status).await["status"], "succeeded");
  }

  #[tokio::test]
  async fn payment_webhook_with_bad_signature_is_a_400() {
    let state = make_state().await;
    let webhook = serde_json::json!({
      "id": "evt_1",
      "type": "payment_intent.succeeded",
      "data": { "object": { "id": "pi-1" } }
    })
    .to_string();

    let resp = oneshot_raw(
      state,
      "POST",
      "/webhooks/payment",
      vec![("x-payment-signature", "t=1,v1=deadbeef")],
      &webhook,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn payment_status_is_hidden_from_other_users() {
    let state = make_state().await;
    let (circle_id, owner) = (Uuid::new_v4(), Uuid::new_v4());

    let create = oneshot_raw(
      state.clone(),
      "POST",
      &format!("/circles/{circle_id}/payments"),
      vec![(header::CONTENT_TYPE.as_str(), "application/json")],
      &serde_json::json!({ "user_id": owner, "amount_minor": 5000 })
        .to_string(),
    )
    .await;
    let payment_id = json_body(create).await["payment_id"]
      .as_str()
      .unwrap()
      .to_string();

    let resp = oneshot_raw(
      state,
      "GET",
      &format!("/payments/{payment_id}/status?user_id={}", Uuid::new_v4()),
      vec![],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(json_body(resp).await["status"].is_null());
  }

  // ── Metrics ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn metrics_endpoint_renders_request_counters() {
    let state = make_state().await;
    oneshot_raw(
      state.clone(),
      "POST",
      &format!("/kyc/start?user_id={}", Uuid::new_v4()),
      vec![],
      "",
    )
    .await;

    let resp = oneshot_raw(state, "GET", "/metrics", vec![], "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(
      text.contains("kyc_requests_total{endpoint=\"start\"} 1"),
      "metrics output: {text}"
    );
    assert!(text.contains("kyc_duration_seconds_count{operation=\"start\"} 1"));
  }
}
