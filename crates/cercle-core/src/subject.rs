//! Subject records — the verification and payment state owned by this system.
//!
//! A subject mirrors an externally-issued identifier (applicant id,
//! payment-intent id) assigned exactly once at creation. Status moves only
//! through the reconciliation pipeline; subjects are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Verification ────────────────────────────────────────────────────────────

/// Lifecycle status of an identity-verification subject.
///
/// `None` is the zero-value reported when no subject exists yet; it is never
/// stored.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
  #[default]
  None,
  Pending,
  Approved,
  Rejected,
}

impl VerificationStatus {
  /// A terminal review verdict. Terminal here restricts only what a proposed
  /// `Pending` may overwrite; a later review event may still flip the verdict.
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Approved | Self::Rejected)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::Rejected => "rejected",
    }
  }
}

/// An identity-verification subject: one per user, keyed externally by the
/// provider-issued applicant id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSubject {
  pub user_id:       Uuid,
  /// Externally-issued applicant id. Assigned once, immutable thereafter.
  pub applicant_id:  String,
  pub status:        VerificationStatus,
  /// The provider's raw review-state string from the last applied event.
  pub review_status: Option<String>,
  /// Full review payload from the last applied event, kept for audit.
  pub review_detail: Option<serde_json::Value>,
  /// Reject labels joined into a single human-readable reason.
  pub reject_reason: Option<String>,
  /// Idempotency marker: the event id of the last applied webhook.
  pub last_event_id: Option<String>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
  pub approved_at:   Option<DateTime<Utc>>,
  pub rejected_at:   Option<DateTime<Utc>>,
}

// ─── Payment ─────────────────────────────────────────────────────────────────

/// Lifecycle status of a payment subject. `Succeeded` is never regressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Pending,
  Succeeded,
  Failed,
  Refunded,
}

impl PaymentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Succeeded => "succeeded",
      Self::Failed => "failed",
      Self::Refunded => "refunded",
    }
  }
}

/// A payment subject: one circle contribution, keyed externally by the
/// provider-issued payment-intent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSubject {
  pub payment_id:    Uuid,
  /// Externally-issued payment-intent id. Assigned once at creation.
  pub intent_id:     String,
  pub circle_id:     Uuid,
  pub user_id:       Uuid,
  /// Amount in minor currency units; fixed at creation, never mutated.
  pub amount_minor:  i64,
  pub status:        PaymentStatus,
  /// Idempotency marker: the event id of the last applied webhook.
  pub last_event_id: Option<String>,
  pub receipt_url:   Option<String>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
  pub confirmed_at:  Option<DateTime<Utc>>,
}

/// Input to [`crate::store::SubjectStore::create_payment`].
/// `payment_id` and timestamps are set by the store.
#[derive(Debug, Clone)]
pub struct NewPayment {
  pub intent_id:    String,
  pub circle_id:    Uuid,
  pub user_id:      Uuid,
  pub amount_minor: i64,
}
