//! Operational endpoints: metrics scraping and liveness.

use axum::{
  Json,
  extract::State,
  http::header,
  response::IntoResponse,
};
use serde_json::json;

use cercle_core::{
  provider::{IdentityProvider, PaymentProvider},
  store::SubjectStore,
};
use cercle_engine::notify::Notifier;

use crate::AppState;

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics<S, I, P, N>(
  State(state): State<AppState<S, I, P, N>>,
) -> impl IntoResponse
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  (
    [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
    state.metrics.to_prometheus_format(),
  )
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
  Json(json!({ "status": "ok" }))
}
