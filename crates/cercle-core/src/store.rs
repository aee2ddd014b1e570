//! The `SubjectStore` trait and supporting change types.
//!
//! The trait is implemented by storage backends (e.g. `cercle-store-sqlite`).
//! Higher layers (`cercle-engine`, `cercle-api`) depend on this abstraction,
//! not on any concrete backend.
//!
//! Event application is expressed as a change set applied under an atomic
//! compare-and-set on the subject's `last_event_id` marker: of two concurrent
//! deliveries carrying the same event id, exactly one wins; the loser
//! observes [`ApplyOutcome::DuplicateEvent`]. Status, idempotency marker, and
//! audit entry land in one transaction or not at all.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  audit::{AuditLogEntry, NewAuditEntry},
  subject::{
    NewPayment, PaymentStatus, PaymentSubject, VerificationStatus,
    VerificationSubject,
  },
};

// ─── Change sets ─────────────────────────────────────────────────────────────

/// Columns to update on a verification subject when an event is applied.
/// A `None` status means "receipt only": record the event id for idempotency
/// without touching the subject's state.
#[derive(Debug, Clone, Default)]
pub struct VerificationChange {
  pub status:        Option<VerificationStatus>,
  pub review_status: Option<String>,
  pub review_detail: Option<serde_json::Value>,
  pub reject_reason: Option<String>,
  /// The incoming event id; becomes the new idempotency marker and the CAS
  /// guard value. `None` skips the guard (provider omitted the id).
  pub event_id:      Option<String>,
  pub approved_at:   Option<DateTime<Utc>>,
  pub rejected_at:   Option<DateTime<Utc>>,
}

impl VerificationChange {
  /// A receipt-only change: marks `event_id` applied, mutates nothing else.
  pub fn receipt(event_id: Option<String>) -> Self {
    Self { event_id, ..Self::default() }
  }
}

/// Columns to update on a payment subject when an event is applied.
#[derive(Debug, Clone, Default)]
pub struct PaymentChange {
  pub status:       Option<PaymentStatus>,
  /// See [`VerificationChange::event_id`].
  pub event_id:     Option<String>,
  pub confirmed_at: Option<DateTime<Utc>>,
}

impl PaymentChange {
  /// A receipt-only change: marks `event_id` applied, mutates nothing else.
  pub fn receipt(event_id: Option<String>) -> Self {
    Self { event_id, ..Self::default() }
  }
}

/// Result of a compare-and-set event application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
  /// The change landed; this delivery won the race (if there was one).
  Applied,
  /// The subject's marker already equals the incoming event id — a
  /// concurrent or earlier delivery of the same event won.
  DuplicateEvent,
  /// No subject row matched the key.
  SubjectMissing,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Cercle subject store backend.
///
/// Subject creation also writes the creation audit entry in the same
/// transaction, as does event application when an audit entry is supplied.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait SubjectStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Verification subjects ─────────────────────────────────────────────

  /// Create a PENDING verification subject for `user_id` with the
  /// externally-issued `applicant_id`, writing `audit` in the same
  /// transaction. Errors if the user or applicant id already has a subject.
  fn create_verification(
    &self,
    user_id: Uuid,
    applicant_id: String,
    audit: NewAuditEntry,
  ) -> impl Future<Output = Result<VerificationSubject, Self::Error>> + Send + '_;

  fn verification_by_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<VerificationSubject>, Self::Error>> + Send + '_;

  fn verification_by_applicant<'a>(
    &'a self,
    applicant_id: &'a str,
  ) -> impl Future<Output = Result<Option<VerificationSubject>, Self::Error>> + Send + 'a;

  /// Apply `change` to the subject keyed by `applicant_id` under the
  /// event-id compare-and-set, writing `audit` (if any) atomically with it.
  fn apply_verification_change<'a>(
    &'a self,
    applicant_id: &'a str,
    change: VerificationChange,
    audit: Option<NewAuditEntry>,
  ) -> impl Future<Output = Result<ApplyOutcome, Self::Error>> + Send + 'a;

  // ── Payment subjects ──────────────────────────────────────────────────

  /// Create a PENDING payment subject, writing `audit` in the same
  /// transaction. Errors if the payment-intent id already has a subject.
  fn create_payment(
    &self,
    input: NewPayment,
    audit: NewAuditEntry,
  ) -> impl Future<Output = Result<PaymentSubject, Self::Error>> + Send + '_;

  fn payment_by_id(
    &self,
    payment_id: Uuid,
  ) -> impl Future<Output = Result<Option<PaymentSubject>, Self::Error>> + Send + '_;

  fn payment_by_intent<'a>(
    &'a self,
    intent_id: &'a str,
  ) -> impl Future<Output = Result<Option<PaymentSubject>, Self::Error>> + Send + 'a;

  /// Apply `change` to the subject keyed by `intent_id` under the event-id
  /// compare-and-set, writing `audit` (if any) atomically with it.
  fn apply_payment_change<'a>(
    &'a self,
    intent_id: &'a str,
    change: PaymentChange,
    audit: Option<NewAuditEntry>,
  ) -> impl Future<Output = Result<ApplyOutcome, Self::Error>> + Send + 'a;

  // ── Audit log ─────────────────────────────────────────────────────────

  /// Append a standalone audit entry (subject-less system events).
  fn append_audit(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditLogEntry, Self::Error>> + Send + '_;

  /// List audit entries, optionally restricted to one user, oldest first.
  fn audit_log(
    &self,
    user_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<AuditLogEntry>, Self::Error>> + Send + '_;
}
