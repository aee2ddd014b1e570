//! The Verification/Payment Lifecycle Service.
//!
//! Owns the initiation flows that create subject records (the reconciliation
//! engine is their only other writer, and only of status) and the
//! client-facing status reads. Initiation is idempotent on "applicant id
//! already exists", so a caller may safely retry after a provider timeout.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use cercle_core::{
  audit::{action, NewAuditEntry},
  provider::{IdentityProvider, IntentMetadata, PaymentProvider},
  store::SubjectStore,
  subject::{NewPayment, PaymentStatus, VerificationStatus},
};

use crate::{metrics::Metrics, Error, Result};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunables for the initiation flows.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
  /// Review level requested from the identity provider.
  pub level_name:       String,
  /// Lifetime of minted SDK access tokens.
  pub token_ttl_secs:   u64,
  /// Inclusive payment bounds, in minor currency units.
  pub min_amount_minor: i64,
  pub max_amount_minor: i64,
}

impl Default for LifecycleConfig {
  fn default() -> Self {
    Self {
      level_name:       "basic-kyc-level".to_string(),
      token_ttl_secs:   600,
      min_amount_minor: 500,
      max_amount_minor: 50_000,
    }
  }
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// Result of a successful `start_verification` call.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationStart {
  pub applicant_id: String,
  /// Short-lived SDK token for the mobile client.
  pub token:        String,
  pub status:       VerificationStatus,
}

/// Read-only projection of a verification subject. `status` is
/// [`VerificationStatus::None`] when no subject exists yet.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationStatusView {
  pub status:       VerificationStatus,
  pub applicant_id: Option<String>,
  pub updated_at:   Option<DateTime<Utc>>,
}

/// Result of a successful `create_payment` call.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentCreated {
  pub payment_id:    Uuid,
  /// Handed to the mobile client to confirm the payment.
  pub client_secret: String,
}

/// Read-only projection of a payment subject. `status` is `None` when no
/// subject exists (or the caller does not own it).
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
  pub status:      Option<PaymentStatus>,
  pub receipt_url: Option<String>,
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Initiation flows and status reads over a [`SubjectStore`] and the two
/// provider collaborators.
pub struct Lifecycle<S, I, P> {
  store:    Arc<S>,
  identity: Arc<I>,
  payments: Arc<P>,
  metrics:  Arc<Metrics>,
  config:   LifecycleConfig,
}

impl<S, I, P> Lifecycle<S, I, P>
where
  S: SubjectStore,
  I: IdentityProvider,
  P: PaymentProvider,
{
  pub fn new(
    store: Arc<S>,
    identity: Arc<I>,
    payments: Arc<P>,
    metrics: Arc<Metrics>,
    config: LifecycleConfig,
  ) -> Self {
    Self { store, identity, payments, metrics, config }
  }

  // ── Verification ──────────────────────────────────────────────────────────

  /// Start (or resume) identity verification for `user_id`.
  ///
  /// Reuses the existing applicant id when one is already assigned; a fresh
  /// SDK token is minted either way.
  pub async fn start_verification(
    &self,
    user_id: Uuid,
  ) -> Result<VerificationStart> {
    let started = Instant::now();
    self.metrics.kyc_requests_total.increment("start");

    let result = self.start_verification_inner(user_id).await;
    if result.is_err() {
      self.metrics.kyc_failure_total.increment("start_error");
    }

    self
      .metrics
      .kyc_duration_seconds
      .observe("start", started.elapsed().as_secs_f64());
    result
  }

  async fn start_verification_inner(
    &self,
    user_id: Uuid,
  ) -> Result<VerificationStart> {
    let external_id = user_id.to_string();

    let (applicant_id, status) = match self
      .store
      .verification_by_user(user_id)
      .await
      .map_err(Error::store)?
    {
      Some(subject) => (subject.applicant_id, subject.status),
      None => {
        let handle = self
          .identity
          .create_applicant(&external_id, &self.config.level_name)
          .await?;
        let audit = NewAuditEntry::new(
          action::KYC_STARTED,
          Some(user_id),
          serde_json::json!({ "applicantId": handle.applicant_id }),
        );
        let subject = self
          .store
          .create_verification(user_id, handle.applicant_id, audit)
          .await
          .map_err(Error::store)?;
        tracing::info!(
          %user_id,
          applicant_id = %subject.applicant_id,
          "verification started"
        );
        (subject.applicant_id, subject.status)
      }
    };

    let token = self
      .identity
      .create_access_token(
        &external_id,
        &self.config.level_name,
        self.config.token_ttl_secs,
      )
      .await?;

    self.metrics.kyc_success_total.increment("started");
    Ok(VerificationStart { applicant_id, token: token.token, status })
  }

  /// Current verification status for `user_id`. Never errors on a missing
  /// subject: reports [`VerificationStatus::None`] instead.
  pub async fn verification_status(
    &self,
    user_id: Uuid,
  ) -> Result<VerificationStatusView> {
    self.metrics.kyc_requests_total.increment("status");

    let view = match self
      .store
      .verification_by_user(user_id)
      .await
      .map_err(Error::store)?
    {
      Some(subject) => VerificationStatusView {
        status:       subject.status,
        applicant_id: Some(subject.applicant_id),
        updated_at:   Some(subject.updated_at),
      },
      None => VerificationStatusView {
        status:       VerificationStatus::None,
        applicant_id: None,
        updated_at:   None,
      },
    };
    Ok(view)
  }

  // ── Payments ──────────────────────────────────────────────────────────────

  /// Create a payment for a circle contribution.
  ///
  /// Amount bounds are checked before the provider is contacted; a violation
  /// never produces a payment intent.
  pub async fn create_payment(
    &self,
    circle_id: Uuid,
    user_id: Uuid,
    amount_minor: i64,
  ) -> Result<PaymentCreated> {
    let started = Instant::now();
    self.metrics.payments_total.increment("created");

    let result =
      self.create_payment_inner(circle_id, user_id, amount_minor).await;
    match &result {
      Ok(_) => self.metrics.payments_success_total.increment("created"),
      Err(_) => self.metrics.payments_failure_total.increment("create_error"),
    }

    self
      .metrics
      .payments_duration_seconds
      .observe("create", started.elapsed().as_secs_f64());
    result
  }

  async fn create_payment_inner(
    &self,
    circle_id: Uuid,
    user_id: Uuid,
    amount_minor: i64,
  ) -> Result<PaymentCreated> {
    let (min, max) =
      (self.config.min_amount_minor, self.config.max_amount_minor);
    if !(min..=max).contains(&amount_minor) {
      return Err(Error::AmountOutOfBounds {
        amount_minor,
        min_minor: min,
        max_minor: max,
      });
    }

    let description = format!("Circle {circle_id} contribution");
    let intent = self
      .payments
      .create_payment_intent(
        amount_minor,
        &description,
        IntentMetadata { circle_id, user_id },
      )
      .await?;

    let audit = NewAuditEntry::new(
      action::PAYMENT_CREATED,
      Some(user_id),
      serde_json::json!({
        "intentId": intent.intent_id,
        "circleId": circle_id,
        "amountMinor": amount_minor,
      }),
    );
    let payment = self
      .store
      .create_payment(
        NewPayment {
          intent_id: intent.intent_id,
          circle_id,
          user_id,
          amount_minor,
        },
        audit,
      )
      .await
      .map_err(Error::store)?;

    tracing::info!(
      payment_id = %payment.payment_id,
      intent_id = %payment.intent_id,
      "payment created"
    );
    Ok(PaymentCreated {
      payment_id:    payment.payment_id,
      client_secret: intent.client_secret,
    })
  }

  /// Current status of `payment_id` as seen by `user_id`. A missing subject
  /// or a non-owner read reports an empty view, never an error.
  pub async fn payment_status(
    &self,
    payment_id: Uuid,
    user_id: Uuid,
  ) -> Result<PaymentStatusView> {
    let view = match self
      .store
      .payment_by_id(payment_id)
      .await
      .map_err(Error::store)?
    {
      Some(payment) if payment.user_id == user_id => PaymentStatusView {
        status:      Some(payment.status),
        receipt_url: payment.receipt_url,
      },
      _ => PaymentStatusView { status: None, receipt_url: None },
    };
    Ok(view)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
