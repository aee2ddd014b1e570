//! Handlers for the client-facing verification endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/kyc/start?user_id=<uuid>` | Starts or resumes verification |
//! | `GET`  | `/kyc/status?user_id=<uuid>` | `"none"` status when absent |
//!
//! The authenticated user identity comes from an external auth collaborator;
//! these handlers take the asserted `user_id` directly.

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use cercle_core::{
  provider::{IdentityProvider, PaymentProvider},
  store::SubjectStore,
};
use cercle_engine::{
  lifecycle::{VerificationStart, VerificationStatusView},
  notify::Notifier,
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct UserParams {
  pub user_id: Uuid,
}

/// `POST /kyc/start?user_id=<uuid>`
pub async fn start<S, I, P, N>(
  State(state): State<AppState<S, I, P, N>>,
  Query(params): Query<UserParams>,
) -> Result<Json<VerificationStart>, ApiError>
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  let started = state.lifecycle.start_verification(params.user_id).await?;
  Ok(Json(started))
}

/// `GET /kyc/status?user_id=<uuid>`
pub async fn status<S, I, P, N>(
  State(state): State<AppState<S, I, P, N>>,
  Query(params): Query<UserParams>,
) -> Result<Json<VerificationStatusView>, ApiError>
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  let view = state.lifecycle.verification_status(params.user_id).await?;
  Ok(Json(view))
}
