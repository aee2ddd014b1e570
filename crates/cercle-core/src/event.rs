//! Webhook payload shapes and the event normalizer.
//!
//! Each provider delivers its own payload shape; normalization maps both into
//! a single [`ReconciliationEvent`] carrying the subject lookup key, the
//! provider-assigned event id, and the proposed outcome. Unrecognised shapes
//! normalize to an event with no outcome, which downstream treats as an
//! acknowledged no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Provider sentinels ──────────────────────────────────────────────────────

/// Review-answer value meaning the applicant passed review.
pub const REVIEW_ANSWER_ACCEPT: &str = "GREEN";
/// Review-answer value meaning the applicant failed review.
pub const REVIEW_ANSWER_REJECT: &str = "RED";
/// Review-status value for an in-progress review.
pub const REVIEW_STATUS_PENDING: &str = "pending";

/// Payment event type for a completed payment intent.
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
/// Payment event type for a failed payment intent.
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";

// ─── Normalized event ────────────────────────────────────────────────────────

/// Which provider an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
  Verification,
  Payment,
}

impl EventSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Verification => "verification",
      Self::Payment => "payment",
    }
  }
}

/// The status a provider event proposes for its subject. The transition
/// resolver decides whether the proposal is honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposedOutcome {
  Approved,
  Rejected { reason: Option<String> },
  Pending,
  Succeeded,
  Failed,
}

/// A provider webhook mapped into the internal canonical shape.
///
/// Ephemeral: it exists only for the duration of one reconciliation pass and
/// is never persisted beyond the audit trail.
#[derive(Debug, Clone)]
pub struct ReconciliationEvent {
  pub source:      EventSource,
  /// Externally-issued subject key: applicant id or payment-intent id.
  pub subject_key: String,
  /// Provider-assigned event id, used for idempotency. Some providers omit
  /// it on occasion; such events pass the guard unconditionally.
  pub event_id:    Option<String>,
  /// `None` means the event proposes no status change (acknowledged no-op).
  pub outcome:     Option<ProposedOutcome>,
  /// The raw payload, retained for the audit trail.
  pub detail:      serde_json::Value,
  pub received_at: DateTime<Utc>,
}

// ─── Identity provider payload ───────────────────────────────────────────────

/// Result object nested in an identity-provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
  pub review_answer: Option<String>,
  #[serde(default)]
  pub reject_labels: Option<Vec<String>>,
}

/// Inbound webhook body from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityWebhook {
  pub applicant_id:   String,
  #[serde(default)]
  pub correlation_id: Option<String>,
  #[serde(default)]
  pub review_status:  Option<String>,
  #[serde(default)]
  pub review_result:  Option<ReviewResult>,
}

impl IdentityWebhook {
  pub fn from_slice(raw: &[u8]) -> Result<Self> {
    serde_json::from_slice(raw).map_err(Error::MalformedPayload)
  }
}

/// Map an identity-provider webhook into a [`ReconciliationEvent`].
pub fn normalize_identity(
  payload: &IdentityWebhook,
  received_at: DateTime<Utc>,
) -> ReconciliationEvent {
  let answer = payload
    .review_result
    .as_ref()
    .and_then(|r| r.review_answer.as_deref());

  let outcome = match answer {
    Some(REVIEW_ANSWER_ACCEPT) => Some(ProposedOutcome::Approved),
    Some(REVIEW_ANSWER_REJECT) => {
      let reason = payload
        .review_result
        .as_ref()
        .and_then(|r| r.reject_labels.as_ref())
        .filter(|labels| !labels.is_empty())
        .map(|labels| labels.join(", "));
      Some(ProposedOutcome::Rejected { reason })
    }
    _ if payload.review_status.as_deref() == Some(REVIEW_STATUS_PENDING) => {
      Some(ProposedOutcome::Pending)
    }
    _ => None,
  };

  ReconciliationEvent {
    source:      EventSource::Verification,
    subject_key: payload.applicant_id.clone(),
    event_id:    payload
      .correlation_id
      .as_deref()
      .filter(|id| !id.is_empty())
      .map(str::to_owned),
    outcome,
    detail:      serde_json::to_value(payload)
      .unwrap_or(serde_json::Value::Null),
    received_at,
  }
}

// ─── Payment provider payload ────────────────────────────────────────────────

/// The payment-intent object nested inside a payment-provider event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentObject {
  pub id:     String,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventData {
  pub object: PaymentIntentObject,
}

/// Inbound event envelope from the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhook {
  pub id:         String,
  #[serde(rename = "type")]
  pub event_type: String,
  pub data:       PaymentEventData,
}

impl PaymentWebhook {
  pub fn from_slice(raw: &[u8]) -> Result<Self> {
    serde_json::from_slice(raw).map_err(Error::MalformedPayload)
  }
}

/// Map a payment-provider event envelope into a [`ReconciliationEvent`].
///
/// Event types other than the two payment-intent terminals normalize to an
/// outcome-less event: acknowledged, logged upstream, no mutation.
pub fn normalize_payment(
  payload: &PaymentWebhook,
  received_at: DateTime<Utc>,
) -> ReconciliationEvent {
  let outcome = match payload.event_type.as_str() {
    EVENT_PAYMENT_SUCCEEDED => Some(ProposedOutcome::Succeeded),
    EVENT_PAYMENT_FAILED => Some(ProposedOutcome::Failed),
    _ => None,
  };

  ReconciliationEvent {
    source:      EventSource::Payment,
    subject_key: payload.data.object.id.clone(),
    event_id:    Some(payload.id.clone()).filter(|id| !id.is_empty()),
    outcome,
    detail:      serde_json::to_value(payload)
      .unwrap_or(serde_json::Value::Null),
    received_at,
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn identity_payload(json: serde_json::Value) -> IdentityWebhook {
    serde_json::from_value(json).unwrap()
  }

  #[test]
  fn green_review_normalizes_to_approved() {
    let payload = identity_payload(serde_json::json!({
      "applicantId": "app-1",
      "correlationId": "c1",
      "reviewStatus": "completed",
      "reviewResult": { "reviewAnswer": "GREEN" }
    }));
    let event = normalize_identity(&payload, Utc::now());

    assert_eq!(event.source, EventSource::Verification);
    assert_eq!(event.subject_key, "app-1");
    assert_eq!(event.event_id.as_deref(), Some("c1"));
    assert_eq!(event.outcome, Some(ProposedOutcome::Approved));
  }

  #[test]
  fn red_review_carries_joined_reject_labels() {
    let payload = identity_payload(serde_json::json!({
      "applicantId": "app-1",
      "reviewResult": {
        "reviewAnswer": "RED",
        "rejectLabels": ["FORGERY", "BAD_SELFIE"]
      }
    }));
    let event = normalize_identity(&payload, Utc::now());

    assert_eq!(
      event.outcome,
      Some(ProposedOutcome::Rejected {
        reason: Some("FORGERY, BAD_SELFIE".to_string()),
      })
    );
  }

  #[test]
  fn red_review_without_labels_has_no_reason() {
    let payload = identity_payload(serde_json::json!({
      "applicantId": "app-1",
      "reviewResult": { "reviewAnswer": "RED" }
    }));
    let event = normalize_identity(&payload, Utc::now());

    assert_eq!(event.outcome, Some(ProposedOutcome::Rejected { reason: None }));
  }

  #[test]
  fn pending_review_status_normalizes_to_pending() {
    let payload = identity_payload(serde_json::json!({
      "applicantId": "app-1",
      "reviewStatus": "pending"
    }));
    let event = normalize_identity(&payload, Utc::now());

    assert_eq!(event.outcome, Some(ProposedOutcome::Pending));
  }

  #[test]
  fn unknown_review_shape_yields_no_outcome() {
    let payload = identity_payload(serde_json::json!({
      "applicantId": "app-1",
      "reviewStatus": "onHold",
      "reviewResult": { "reviewAnswer": "YELLOW" }
    }));
    let event = normalize_identity(&payload, Utc::now());

    assert!(event.outcome.is_none());
  }

  #[test]
  fn empty_correlation_id_is_dropped() {
    let payload = identity_payload(serde_json::json!({
      "applicantId": "app-1",
      "correlationId": "",
      "reviewResult": { "reviewAnswer": "GREEN" }
    }));
    let event = normalize_identity(&payload, Utc::now());

    assert!(event.event_id.is_none());
  }

  #[test]
  fn malformed_identity_payload_errors() {
    assert!(IdentityWebhook::from_slice(b"not json").is_err());
    // Missing the required applicantId field.
    assert!(IdentityWebhook::from_slice(b"{\"reviewStatus\":\"pending\"}").is_err());
  }

  #[test]
  fn payment_succeeded_event_type_normalizes() {
    let payload = PaymentWebhook::from_slice(
      serde_json::json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_1", "status": "succeeded", "amount": 5000 } }
      })
      .to_string()
      .as_bytes(),
    )
    .unwrap();
    let event = normalize_payment(&payload, Utc::now());

    assert_eq!(event.source, EventSource::Payment);
    assert_eq!(event.subject_key, "pi_1");
    assert_eq!(event.event_id.as_deref(), Some("evt_1"));
    assert_eq!(event.outcome, Some(ProposedOutcome::Succeeded));
  }

  #[test]
  fn payment_failed_event_type_normalizes() {
    let payload = PaymentWebhook::from_slice(
      serde_json::json!({
        "id": "evt_2",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": "pi_1" } }
      })
      .to_string()
      .as_bytes(),
    )
    .unwrap();
    let event = normalize_payment(&payload, Utc::now());

    assert_eq!(event.outcome, Some(ProposedOutcome::Failed));
  }

  #[test]
  fn unrelated_payment_event_type_is_outcome_less() {
    let payload = PaymentWebhook::from_slice(
      serde_json::json!({
        "id": "evt_3",
        "type": "charge.refunded",
        "data": { "object": { "id": "pi_1" } }
      })
      .to_string()
      .as_bytes(),
    )
    .unwrap();
    let event = normalize_payment(&payload, Utc::now());

    assert!(event.outcome.is_none());
  }
}
