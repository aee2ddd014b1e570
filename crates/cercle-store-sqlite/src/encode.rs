//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Event detail blobs are
//! stored as compact JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use cercle_core::{
  audit::AuditLogEntry,
  subject::{PaymentStatus, PaymentSubject, VerificationStatus, VerificationSubject},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Statuses ────────────────────────────────────────────────────────────────

pub fn encode_verification_status(s: VerificationStatus) -> &'static str {
  s.as_str()
}

pub fn decode_verification_status(s: &str) -> Result<VerificationStatus> {
  match s {
    "pending" => Ok(VerificationStatus::Pending),
    "approved" => Ok(VerificationStatus::Approved),
    "rejected" => Ok(VerificationStatus::Rejected),
    other => {
      Err(Error::Decode(format!("unknown verification status: {other:?}")))
    }
  }
}

pub fn encode_payment_status(s: PaymentStatus) -> &'static str { s.as_str() }

pub fn decode_payment_status(s: &str) -> Result<PaymentStatus> {
  match s {
    "pending" => Ok(PaymentStatus::Pending),
    "succeeded" => Ok(PaymentStatus::Succeeded),
    "failed" => Ok(PaymentStatus::Failed),
    "refunded" => Ok(PaymentStatus::Refunded),
    other => Err(Error::Decode(format!("unknown payment status: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `verification_subjects` row.
pub struct RawVerification {
  pub user_id:       String,
  pub applicant_id:  String,
  pub status:        String,
  pub review_status: Option<String>,
  pub review_detail: Option<String>,
  pub reject_reason: Option<String>,
  pub last_event_id: Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
  pub approved_at:   Option<String>,
  pub rejected_at:   Option<String>,
}

impl RawVerification {
  pub fn into_subject(self) -> Result<VerificationSubject> {
    let review_detail = self
      .review_detail
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;

    Ok(VerificationSubject {
      user_id:       decode_uuid(&self.user_id)?,
      applicant_id:  self.applicant_id,
      status:        decode_verification_status(&self.status)?,
      review_status: self.review_status,
      review_detail,
      reject_reason: self.reject_reason,
      last_event_id: self.last_event_id,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
      approved_at:   self.approved_at.as_deref().map(decode_dt).transpose()?,
      rejected_at:   self.rejected_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw strings read directly from a `payment_subjects` row.
pub struct RawPayment {
  pub payment_id:    String,
  pub intent_id:     String,
  pub circle_id:     String,
  pub user_id:       String,
  pub amount_minor:  i64,
  pub status:        String,
  pub last_event_id: Option<String>,
  pub receipt_url:   Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
  pub confirmed_at:  Option<String>,
}

impl RawPayment {
  pub fn into_subject(self) -> Result<PaymentSubject> {
    Ok(PaymentSubject {
      payment_id:    decode_uuid(&self.payment_id)?,
      intent_id:     self.intent_id,
      circle_id:     decode_uuid(&self.circle_id)?,
      user_id:       decode_uuid(&self.user_id)?,
      amount_minor:  self.amount_minor,
      status:        decode_payment_status(&self.status)?,
      last_event_id: self.last_event_id,
      receipt_url:   self.receipt_url,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
      confirmed_at:  self.confirmed_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw strings read directly from an `audit_log` row.
pub struct RawAuditEntry {
  pub entry_id:   String,
  pub user_id:    Option<String>,
  pub action:     String,
  pub detail:     String,
  pub created_at: String,
}

impl RawAuditEntry {
  pub fn into_entry(self) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
      entry_id:   decode_uuid(&self.entry_id)?,
      user_id:    self.user_id.as_deref().map(decode_uuid).transpose()?,
      action:     self.action,
      detail:     serde_json::from_str(&self.detail)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
