//! Audit-log records.
//!
//! The audit log is strictly append-only: one entry per subject creation and
//! one per accepted event that actually changes a subject's status. Entries
//! are retained indefinitely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action labels written to the audit log.
pub mod action {
  pub const KYC_STARTED: &str = "kyc_started";
  pub const KYC_APPROVED: &str = "kyc_approved";
  pub const KYC_REJECTED: &str = "kyc_rejected";
  pub const KYC_UPDATED: &str = "kyc_updated";
  pub const PAYMENT_CREATED: &str = "payment_created";
  pub const PAYMENT_SUCCEEDED: &str = "payment_succeeded";
  pub const PAYMENT_FAILED: &str = "payment_failed";
}

/// An immutable audit record. Once written, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub entry_id:   Uuid,
  /// The affected user; `None` for subject-less system events.
  pub user_id:    Option<Uuid>,
  pub action:     String,
  pub detail:     serde_json::Value,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::SubjectStore::append_audit`].
/// `entry_id` and `created_at` are set by the store.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub user_id: Option<Uuid>,
  pub action:  String,
  pub detail:  serde_json::Value,
}

impl NewAuditEntry {
  pub fn new(
    action: impl Into<String>,
    user_id: Option<Uuid>,
    detail: serde_json::Value,
  ) -> Self {
    Self { user_id, action: action.into(), detail }
  }
}
