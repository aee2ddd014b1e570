//! The Reconciliation Applier.
//!
//! One pipeline per inbound webhook: verify the signature, normalize the
//! payload, look up the subject, run the idempotency guard, resolve the
//! status transition, and persist status + idempotency marker + audit entry
//! as one unit of work. Side effects (audit, metrics, notification) gate
//! strictly on an actual status change.
//!
//! Duplicates, unknown subjects, and unmodeled event types are acknowledged
//! outcomes, not errors — the provider must not retry them. Only a signature
//! failure or a malformed payload is reported back as an error.

use std::{sync::Arc, time::Instant};

use chrono::Utc;
use cercle_core::{
  audit::{action, NewAuditEntry},
  event::{
    normalize_identity, normalize_payment, EventSource, IdentityWebhook,
    PaymentWebhook, ProposedOutcome, ReconciliationEvent,
  },
  signature::WebhookVerifier,
  store::{ApplyOutcome, PaymentChange, SubjectStore, VerificationChange},
  subject::{PaymentStatus, VerificationStatus},
  transition::{resolve_payment, resolve_verification},
};

use crate::{metrics::Metrics, notify::Notifier, Error, Result};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Terminal state of one reconciliation pass. Every variant is acknowledged
/// to the provider as success; signature and parse failures surface as
/// [`Error`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
  /// The subject's status changed and the full unit of work landed.
  Applied,
  /// The event was accepted but proposed no new status; at most the
  /// idempotency marker was recorded.
  NoChange,
  /// The event id was already applied to this subject.
  Duplicate,
  /// No local subject matches the event's external id. Nothing persisted.
  UnknownSubject,
  /// The event type/outcome is not modeled. Nothing persisted.
  Unhandled,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Applies authenticated provider events onto subject records.
///
/// The only writer of subject status; the Lifecycle service only ever
/// creates subjects.
pub struct Reconciler<S, N> {
  store:             Arc<S>,
  notifier:          Arc<N>,
  metrics:           Arc<Metrics>,
  identity_webhooks: WebhookVerifier,
  payment_webhooks:  WebhookVerifier,
}

impl<S, N> Reconciler<S, N>
where
  S: SubjectStore,
  N: Notifier,
{
  pub fn new(
    store: Arc<S>,
    notifier: Arc<N>,
    metrics: Arc<Metrics>,
    identity_webhooks: WebhookVerifier,
    payment_webhooks: WebhookVerifier,
  ) -> Self {
    Self { store, notifier, metrics, identity_webhooks, payment_webhooks }
  }

  // ── Verification events ───────────────────────────────────────────────────

  /// Apply an identity-provider webhook delivery.
  pub async fn reconcile_verification(
    &self,
    raw: &[u8],
    signature: &str,
  ) -> Result<ReconcileOutcome> {
    let started = Instant::now();
    self.metrics.kyc_requests_total.increment("webhook");

    let result = self.apply_verification(raw, signature).await;
    match &result {
      Err(Error::InvalidSignature) => {}
      Err(_) => self.metrics.kyc_failure_total.increment("webhook_error"),
      Ok(_) => {}
    }

    self
      .metrics
      .kyc_duration_seconds
      .observe("webhook", started.elapsed().as_secs_f64());
    result
  }

  async fn apply_verification(
    &self,
    raw: &[u8],
    signature: &str,
  ) -> Result<ReconcileOutcome> {
    if !self.identity_webhooks.verify(raw, signature) {
      tracing::warn!("identity webhook rejected: invalid signature");
      self.metrics.kyc_failure_total.increment("invalid_signature");
      return Err(Error::InvalidSignature);
    }

    let payload = IdentityWebhook::from_slice(raw)?;
    let event = normalize_identity(&payload, Utc::now());
    tracing::info!(
      applicant_id = %event.subject_key,
      event_id = ?event.event_id,
      "processing identity webhook"
    );

    let Some(subject) = self
      .store
      .verification_by_applicant(&event.subject_key)
      .await
      .map_err(Error::store)?
    else {
      tracing::warn!(
        applicant_id = %event.subject_key,
        "identity webhook for unknown subject"
      );
      return Ok(ReconcileOutcome::UnknownSubject);
    };

    if already_applied(subject.last_event_id.as_deref(), event.event_id.as_deref())
    {
      tracing::info!(
        event_id = ?event.event_id,
        "identity webhook already processed"
      );
      return Ok(ReconcileOutcome::Duplicate);
    }

    let new_status = resolve_verification(subject.status, event.outcome.as_ref());
    if new_status == subject.status {
      return self.record_verification_receipt(&event).await;
    }

    let now = Utc::now();
    let reject_reason = match &event.outcome {
      Some(ProposedOutcome::Rejected { reason }) => reason.clone(),
      _ => None,
    };
    let change = VerificationChange {
      status: Some(new_status),
      review_status: payload.review_status.clone(),
      review_detail: Some(event.detail.clone()),
      reject_reason,
      event_id: event.event_id.clone(),
      approved_at: (new_status == VerificationStatus::Approved).then_some(now),
      rejected_at: (new_status == VerificationStatus::Rejected).then_some(now),
    };
    let audit_action = match new_status {
      VerificationStatus::Approved => action::KYC_APPROVED,
      VerificationStatus::Rejected => action::KYC_REJECTED,
      _ => action::KYC_UPDATED,
    };
    let audit =
      NewAuditEntry::new(audit_action, Some(subject.user_id), event.detail.clone());

    match self
      .store
      .apply_verification_change(&event.subject_key, change, Some(audit))
      .await
      .map_err(Error::store)?
    {
      ApplyOutcome::Applied => {
        self.metrics.kyc_success_total.increment(new_status.as_str());
        tracing::info!(
          applicant_id = %event.subject_key,
          status = new_status.as_str(),
          "verification status updated"
        );
        Ok(ReconcileOutcome::Applied)
      }
      // Lost the race against a concurrent delivery of the same event.
      ApplyOutcome::DuplicateEvent => Ok(ReconcileOutcome::Duplicate),
      ApplyOutcome::SubjectMissing => Ok(ReconcileOutcome::UnknownSubject),
    }
  }

  async fn record_verification_receipt(
    &self,
    event: &ReconciliationEvent,
  ) -> Result<ReconcileOutcome> {
    // Nothing to record when the provider omitted an event id.
    if event.event_id.is_none() {
      return Ok(ReconcileOutcome::NoChange);
    }
    match self
      .store
      .apply_verification_change(
        &event.subject_key,
        VerificationChange::receipt(event.event_id.clone()),
        None,
      )
      .await
      .map_err(Error::store)?
    {
      ApplyOutcome::Applied => Ok(ReconcileOutcome::NoChange),
      ApplyOutcome::DuplicateEvent => Ok(ReconcileOutcome::Duplicate),
      ApplyOutcome::SubjectMissing => Ok(ReconcileOutcome::UnknownSubject),
    }
  }

  // ── Payment events ────────────────────────────────────────────────────────

  /// Apply a payment-provider webhook delivery.
  pub async fn reconcile_payment(
    &self,
    raw: &[u8],
    signature: &str,
  ) -> Result<ReconcileOutcome> {
    let started = Instant::now();
    self.metrics.payments_total.increment("webhook");

    let result = self.apply_payment(raw, signature).await;
    match &result {
      Ok(_) => {
        self.metrics.payments_success_total.increment("webhook_processed");
      }
      Err(Error::InvalidSignature) => {}
      Err(_) => self.metrics.payments_failure_total.increment("webhook_error"),
    }

    self
      .metrics
      .payments_duration_seconds
      .observe("webhook", started.elapsed().as_secs_f64());
    result
  }

  async fn apply_payment(
    &self,
    raw: &[u8],
    signature: &str,
  ) -> Result<ReconcileOutcome> {
    if !self.payment_webhooks.verify(raw, signature) {
      tracing::warn!("payment webhook rejected: invalid signature");
      self.metrics.payments_failure_total.increment("invalid_signature");
      return Err(Error::InvalidSignature);
    }

    let payload = PaymentWebhook::from_slice(raw)?;
    let event = normalize_payment(&payload, Utc::now());
    tracing::info!(
      event_id = ?event.event_id,
      event_type = %payload.event_type,
      "processing payment webhook"
    );

    if event.outcome.is_none() {
      tracing::info!(
        event_type = %payload.event_type,
        "unhandled payment webhook event type"
      );
      self
        .metrics
        .webhook_unhandled_total
        .increment(EventSource::Payment.as_str());
      return Ok(ReconcileOutcome::Unhandled);
    }

    let Some(subject) = self
      .store
      .payment_by_intent(&event.subject_key)
      .await
      .map_err(Error::store)?
    else {
      tracing::warn!(
        intent_id = %event.subject_key,
        "payment webhook for unknown subject"
      );
      return Ok(ReconcileOutcome::UnknownSubject);
    };

    if already_applied(subject.last_event_id.as_deref(), event.event_id.as_deref())
    {
      tracing::info!(
        event_id = ?event.event_id,
        "payment webhook already processed"
      );
      return Ok(ReconcileOutcome::Duplicate);
    }

    let new_status = resolve_payment(subject.status, event.outcome.as_ref());
    if new_status == subject.status {
      // A repeat success or a stale failure: record the receipt, skip every
      // other side effect (no audit, no metrics, no re-notification).
      if event.event_id.is_none() {
        return Ok(ReconcileOutcome::NoChange);
      }
      return match self
        .store
        .apply_payment_change(
          &event.subject_key,
          PaymentChange::receipt(event.event_id.clone()),
          None,
        )
        .await
        .map_err(Error::store)?
      {
        ApplyOutcome::Applied => Ok(ReconcileOutcome::NoChange),
        ApplyOutcome::DuplicateEvent => Ok(ReconcileOutcome::Duplicate),
        ApplyOutcome::SubjectMissing => Ok(ReconcileOutcome::UnknownSubject),
      };
    }

    let now = Utc::now();
    let change = PaymentChange {
      status: Some(new_status),
      event_id: event.event_id.clone(),
      confirmed_at: (new_status == PaymentStatus::Succeeded).then_some(now),
    };
    let audit_action = match new_status {
      PaymentStatus::Succeeded => action::PAYMENT_SUCCEEDED,
      _ => action::PAYMENT_FAILED,
    };
    let audit = NewAuditEntry::new(
      audit_action,
      Some(subject.user_id),
      serde_json::json!({
        "eventId": event.event_id,
        "eventType": payload.event_type,
        "intentId": event.subject_key,
        "amountMinor": subject.amount_minor,
      }),
    );

    match self
      .store
      .apply_payment_change(&event.subject_key, change, Some(audit))
      .await
      .map_err(Error::store)?
    {
      ApplyOutcome::Applied => {
        tracing::info!(
          payment_id = %subject.payment_id,
          status = new_status.as_str(),
          "payment status updated"
        );
        match new_status {
          PaymentStatus::Succeeded => {
            self.metrics.payments_success_total.increment("succeeded");
            // Best-effort: a notification failure must never fail the
            // webhook response or roll the transition back.
            if let Err(e) = self
              .notifier
              .payment_succeeded(subject.user_id, subject.payment_id)
              .await
            {
              tracing::warn!(
                error = %e,
                payment_id = %subject.payment_id,
                "payment success notification failed"
              );
            }
          }
          PaymentStatus::Failed => {
            self.metrics.payments_failure_total.increment("payment_failed");
          }
          _ => {}
        }
        Ok(ReconcileOutcome::Applied)
      }
      ApplyOutcome::DuplicateEvent => Ok(ReconcileOutcome::Duplicate),
      ApplyOutcome::SubjectMissing => Ok(ReconcileOutcome::UnknownSubject),
    }
  }
}

/// The idempotency pre-check: applied iff both ids are present and equal.
/// An event with no id is never a duplicate (the provider sometimes omits
/// them; we accept weaker replay protection for those).
fn already_applied(stored: Option<&str>, incoming: Option<&str>) -> bool {
  match (stored, incoming) {
    (Some(stored), Some(incoming)) => stored == incoming,
    _ => false,
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
