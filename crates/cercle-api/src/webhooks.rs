//! Inbound webhook endpoints.
//!
//! | Method | Path | Signature header |
//! |--------|------|------------------|
//! | `POST` | `/webhooks/identity` | `x-payload-digest` (hex HMAC) |
//! | `POST` | `/webhooks/payment`  | `x-payment-signature` (`t=…,v1=…`) |
//!
//! Handlers read the raw body bytes — the signature covers them exactly as
//! delivered. Every accepted outcome (applied, duplicate, unknown subject,
//! unhandled type) answers `{"success": true}`; only a signature failure or
//! a malformed payload is a 400.

use axum::{Json, extract::State, http::HeaderMap};
use bytes::Bytes;
use serde_json::json;

use cercle_core::{
  provider::{IdentityProvider, PaymentProvider},
  store::SubjectStore,
};
use cercle_engine::notify::Notifier;

use crate::{AppState, error::ApiError};

/// Signature header for identity-provider deliveries.
pub const IDENTITY_SIGNATURE_HEADER: &str = "x-payload-digest";
/// Signature header for payment-provider deliveries.
pub const PAYMENT_SIGNATURE_HEADER: &str = "x-payment-signature";

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> &'h str {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
}

/// `POST /webhooks/identity`
pub async fn identity<S, I, P, N>(
  State(state): State<AppState<S, I, P, N>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  let signature = header_value(&headers, IDENTITY_SIGNATURE_HEADER);
  state
    .reconciler
    .reconcile_verification(&body, signature)
    .await?;
  Ok(Json(json!({ "success": true })))
}

/// `POST /webhooks/payment`
pub async fn payment<S, I, P, N>(
  State(state): State<AppState<S, I, P, N>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  let signature = header_value(&headers, PAYMENT_SIGNATURE_HEADER);
  state.reconciler.reconcile_payment(&body, signature).await?;
  Ok(Json(json!({ "success": true })))
}
