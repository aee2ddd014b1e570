//! [`SqliteStore`] — the SQLite implementation of [`SubjectStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use cercle_core::{
  audit::{AuditLogEntry, NewAuditEntry},
  store::{
    ApplyOutcome, PaymentChange, SubjectStore, VerificationChange,
  },
  subject::{
    NewPayment, PaymentStatus, PaymentSubject, VerificationStatus,
    VerificationSubject,
  },
};

use crate::{
  encode::{
    encode_dt, encode_payment_status, encode_uuid,
    encode_verification_status, RawAuditEntry, RawPayment, RawVerification,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Cercle subject store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// funnel through one connection, so event application is serialized per
/// process on top of the transactional compare-and-set.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert an audit row inside an open transaction.
  fn insert_audit_row(
    tx: &rusqlite::Transaction<'_>,
    entry: &NewAuditEntry,
  ) -> rusqlite::Result<()> {
    tx.execute(
      "INSERT INTO audit_log (entry_id, user_id, action, detail, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        entry.user_id.map(encode_uuid),
        entry.action,
        entry.detail.to_string(),
        encode_dt(Utc::now()),
      ],
    )?;
    Ok(())
  }
}

// ─── SubjectStore impl ───────────────────────────────────────────────────────

impl SubjectStore for SqliteStore {
  type Error = Error;

  // ── Verification subjects ─────────────────────────────────────────────────

  async fn create_verification(
    &self,
    user_id: Uuid,
    applicant_id: String,
    audit: NewAuditEntry,
  ) -> Result<VerificationSubject> {
    let now = Utc::now();
    let subject = VerificationSubject {
      user_id,
      applicant_id,
      status: VerificationStatus::Pending,
      review_status: None,
      review_detail: None,
      reject_reason: None,
      last_event_id: None,
      created_at: now,
      updated_at: now,
      approved_at: None,
      rejected_at: None,
    };

    let user_id_str = encode_uuid(user_id);
    let applicant_id_str = subject.applicant_id.clone();
    let status_str = encode_verification_status(subject.status).to_owned();
    let at_str = encode_dt(now);

    let created: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM verification_subjects
             WHERE user_id = ?1 OR applicant_id = ?2",
            rusqlite::params![user_id_str, applicant_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if exists {
          return Ok(false);
        }

        tx.execute(
          "INSERT INTO verification_subjects
             (user_id, applicant_id, status, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![user_id_str, applicant_id_str, status_str, at_str],
        )?;
        Self::insert_audit_row(&tx, &audit)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !created {
      return Err(Error::SubjectExists(format!("user {user_id}")));
    }
    Ok(subject)
  }

  async fn verification_by_user(
    &self,
    user_id: Uuid,
  ) -> Result<Option<VerificationSubject>> {
    let id_str = encode_uuid(user_id);

    let raw: Option<RawVerification> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, applicant_id, status, review_status,
                    review_detail, reject_reason, last_event_id,
                    created_at, updated_at, approved_at, rejected_at
             FROM verification_subjects WHERE user_id = ?1",
            rusqlite::params![id_str],
            verification_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawVerification::into_subject).transpose()
  }

  async fn verification_by_applicant(
    &self,
    applicant_id: &str,
  ) -> Result<Option<VerificationSubject>> {
    let applicant_id = applicant_id.to_owned();

    let raw: Option<RawVerification> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, applicant_id, status, review_status,
                    review_detail, reject_reason, last_event_id,
                    created_at, updated_at, approved_at, rejected_at
             FROM verification_subjects WHERE applicant_id = ?1",
            rusqlite::params![applicant_id],
            verification_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawVerification::into_subject).transpose()
  }

  async fn apply_verification_change(
    &self,
    applicant_id: &str,
    change: VerificationChange,
    audit: Option<NewAuditEntry>,
  ) -> Result<ApplyOutcome> {
    let applicant_id = applicant_id.to_owned();
    let status_str =
      change.status.map(|s| encode_verification_status(s).to_owned());
    let review_detail_str =
      change.review_detail.as_ref().map(|d| d.to_string());
    let approved_at_str = change.approved_at.map(encode_dt);
    let rejected_at_str = change.rejected_at.map(encode_dt);
    let now_str = encode_dt(Utc::now());
    let review_status = change.review_status;
    let reject_reason = change.reject_reason;
    let event_id = change.event_id;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // CAS on last_event_id: a delivery whose event id is already the
        // stored marker matches zero rows and loses the race.
        let affected = tx.execute(
          "UPDATE verification_subjects SET
             status        = COALESCE(?2, status),
             review_status = COALESCE(?3, review_status),
             review_detail = COALESCE(?4, review_detail),
             reject_reason = COALESCE(?5, reject_reason),
             last_event_id = COALESCE(?6, last_event_id),
             approved_at   = COALESCE(?7, approved_at),
             rejected_at   = COALESCE(?8, rejected_at),
             updated_at    = ?9
           WHERE applicant_id = ?1
             AND (?6 IS NULL
                  OR last_event_id IS NULL
                  OR last_event_id <> ?6)",
          rusqlite::params![
            applicant_id,
            status_str,
            review_status,
            review_detail_str,
            reject_reason,
            event_id,
            approved_at_str,
            rejected_at_str,
            now_str,
          ],
        )?;

        if affected == 0 {
          let exists: bool = tx
            .query_row(
              "SELECT 1 FROM verification_subjects WHERE applicant_id = ?1",
              rusqlite::params![applicant_id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          return Ok(if exists {
            ApplyOutcome::DuplicateEvent
          } else {
            ApplyOutcome::SubjectMissing
          });
        }

        if let Some(entry) = &audit {
          Self::insert_audit_row(&tx, entry)?;
        }
        tx.commit()?;
        Ok(ApplyOutcome::Applied)
      })
      .await?;

    Ok(outcome)
  }

  // ── Payment subjects ──────────────────────────────────────────────────────

  async fn create_payment(
    &self,
    input: NewPayment,
    audit: NewAuditEntry,
  ) -> Result<PaymentSubject> {
    let now = Utc::now();
    let subject = PaymentSubject {
      payment_id: Uuid::new_v4(),
      intent_id: input.intent_id,
      circle_id: input.circle_id,
      user_id: input.user_id,
      amount_minor: input.amount_minor,
      status: PaymentStatus::Pending,
      last_event_id: None,
      receipt_url: None,
      created_at: now,
      updated_at: now,
      confirmed_at: None,
    };

    let payment_id_str = encode_uuid(subject.payment_id);
    let intent_id_str = subject.intent_id.clone();
    let circle_id_str = encode_uuid(subject.circle_id);
    let user_id_str = encode_uuid(subject.user_id);
    let amount = subject.amount_minor;
    let status_str = encode_payment_status(subject.status).to_owned();
    let at_str = encode_dt(now);

    let created: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM payment_subjects WHERE intent_id = ?1",
            rusqlite::params![intent_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if exists {
          return Ok(false);
        }

        tx.execute(
          "INSERT INTO payment_subjects
             (payment_id, intent_id, circle_id, user_id, amount_minor,
              status, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          rusqlite::params![
            payment_id_str,
            intent_id_str,
            circle_id_str,
            user_id_str,
            amount,
            status_str,
            at_str,
          ],
        )?;
        Self::insert_audit_row(&tx, &audit)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !created {
      return Err(Error::SubjectExists(format!(
        "payment intent {}",
        subject.intent_id
      )));
    }
    Ok(subject)
  }

  async fn payment_by_id(
    &self,
    payment_id: Uuid,
  ) -> Result<Option<PaymentSubject>> {
    let id_str = encode_uuid(payment_id);

    let raw: Option<RawPayment> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT payment_id, intent_id, circle_id, user_id, amount_minor,
                    status, last_event_id, receipt_url,
                    created_at, updated_at, confirmed_at
             FROM payment_subjects WHERE payment_id = ?1",
            rusqlite::params![id_str],
            payment_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPayment::into_subject).transpose()
  }

  async fn payment_by_intent(
    &self,
    intent_id: &str,
  ) -> Result<Option<PaymentSubject>> {
    let intent_id = intent_id.to_owned();

    let raw: Option<RawPayment> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT payment_id, intent_id, circle_id, user_id, amount_minor,
                    status, last_event_id, receipt_url,
                    created_at, updated_at, confirmed_at
             FROM payment_subjects WHERE intent_id = ?1",
            rusqlite::params![intent_id],
            payment_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPayment::into_subject).transpose()
  }

  async fn apply_payment_change(
    &self,
    intent_id: &str,
    change: PaymentChange,
    audit: Option<NewAuditEntry>,
  ) -> Result<ApplyOutcome> {
    let intent_id = intent_id.to_owned();
    let status_str = change.status.map(|s| encode_payment_status(s).to_owned());
    let confirmed_at_str = change.confirmed_at.map(encode_dt);
    let now_str = encode_dt(Utc::now());
    let event_id = change.event_id;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let affected = tx.execute(
          "UPDATE payment_subjects SET
             status        = COALESCE(?2, status),
             last_event_id = COALESCE(?3, last_event_id),
             confirmed_at  = COALESCE(?4, confirmed_at),
             updated_at    = ?5
           WHERE intent_id = ?1
             AND (?3 IS NULL
                  OR last_event_id IS NULL
                  OR last_event_id <> ?3)",
          rusqlite::params![
            intent_id,
            status_str,
            event_id,
            confirmed_at_str,
            now_str,
          ],
        )?;

        if affected == 0 {
          let exists: bool = tx
            .query_row(
              "SELECT 1 FROM payment_subjects WHERE intent_id = ?1",
              rusqlite::params![intent_id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          return Ok(if exists {
            ApplyOutcome::DuplicateEvent
          } else {
            ApplyOutcome::SubjectMissing
          });
        }

        if let Some(entry) = &audit {
          Self::insert_audit_row(&tx, entry)?;
        }
        tx.commit()?;
        Ok(ApplyOutcome::Applied)
      })
      .await?;

    Ok(outcome)
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
    let record = AuditLogEntry {
      entry_id:   Uuid::new_v4(),
      user_id:    entry.user_id,
      action:     entry.action.clone(),
      detail:     entry.detail.clone(),
      created_at: Utc::now(),
    };

    let entry_id_str = encode_uuid(record.entry_id);
    let user_id_str = record.user_id.map(encode_uuid);
    let action = record.action.clone();
    let detail_str = record.detail.to_string();
    let at_str = encode_dt(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (entry_id, user_id, action, detail, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![entry_id_str, user_id_str, action, detail_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn audit_log(
    &self,
    user_id: Option<Uuid>,
  ) -> Result<Vec<AuditLogEntry>> {
    let user_id_str = user_id.map(encode_uuid);

    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(uid) = user_id_str {
          let mut stmt = conn.prepare(
            "SELECT entry_id, user_id, action, detail, created_at
             FROM audit_log WHERE user_id = ?1 ORDER BY created_at, entry_id",
          )?;
          stmt
            .query_map(rusqlite::params![uid], audit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(
            "SELECT entry_id, user_id, action, detail, created_at
             FROM audit_log ORDER BY created_at, entry_id",
          )?;
          stmt
            .query_map([], audit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditEntry::into_entry).collect()
  }
}

// ─── Row mappers ─────────────────────────────────────────────────────────────

fn verification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVerification> {
  Ok(RawVerification {
    user_id:       row.get(0)?,
    applicant_id:  row.get(1)?,
    status:        row.get(2)?,
    review_status: row.get(3)?,
    review_detail: row.get(4)?,
    reject_reason: row.get(5)?,
    last_event_id: row.get(6)?,
    created_at:    row.get(7)?,
    updated_at:    row.get(8)?,
    approved_at:   row.get(9)?,
    rejected_at:   row.get(10)?,
  })
}

fn payment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPayment> {
  Ok(RawPayment {
    payment_id:    row.get(0)?,
    intent_id:     row.get(1)?,
    circle_id:     row.get(2)?,
    user_id:       row.get(3)?,
    amount_minor:  row.get(4)?,
    status:        row.get(5)?,
    last_event_id: row.get(6)?,
    receipt_url:   row.get(7)?,
    created_at:    row.get(8)?,
    updated_at:    row.get(9)?,
    confirmed_at:  row.get(10)?,
  })
}

fn audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAuditEntry> {
  Ok(RawAuditEntry {
    entry_id:   row.get(0)?,
    user_id:    row.get(1)?,
    action:     row.get(2)?,
    detail:     row.get(3)?,
    created_at: row.get(4)?,
  })
}
