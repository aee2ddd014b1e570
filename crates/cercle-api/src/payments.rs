//! Handlers for the client-facing payment endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/circles/:circle_id/payments` | Body: `{"user_id", "amount_minor"}` |
//! | `GET`  | `/payments/:payment_id/status?user_id=<uuid>` | Null status when absent |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use cercle_core::{
  provider::{IdentityProvider, PaymentProvider},
  store::SubjectStore,
};
use cercle_engine::{lifecycle::PaymentStatusView, notify::Notifier};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub user_id:      Uuid,
  /// Contribution amount in minor currency units.
  pub amount_minor: i64,
}

/// `POST /circles/:circle_id/payments`
pub async fn create<S, I, P, N>(
  State(state): State<AppState<S, I, P, N>>,
  Path(circle_id): Path<Uuid>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  let created = state
    .lifecycle
    .create_payment(circle_id, body.user_id, body.amount_minor)
    .await?;
  Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
  pub user_id: Uuid,
}

/// `GET /payments/:payment_id/status?user_id=<uuid>`
pub async fn status<S, I, P, N>(
  State(state): State<AppState<S, I, P, N>>,
  Path(payment_id): Path<Uuid>,
  Query(params): Query<StatusParams>,
) -> Result<Json<PaymentStatusView>, ApiError>
where
  S: SubjectStore + 'static,
  I: IdentityProvider + 'static,
  P: PaymentProvider + 'static,
  N: Notifier + 'static,
{
  let view = state
    .lifecycle
    .payment_status(payment_id, params.user_id)
    .await?;
  Ok(Json(view))
}
