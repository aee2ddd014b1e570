//! Best-effort notification dispatch.
//!
//! Dispatch happens only after a successful status transition has been
//! persisted, and a failure is caught and logged by the caller — it never
//! rolls the transition back nor fails the webhook response.

use std::future::Future;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

/// The push-notification seam. Delivery mechanics live behind it.
pub trait Notifier: Send + Sync {
  /// Tell `user_id` their payment settled.
  fn payment_succeeded(
    &self,
    user_id: Uuid,
    payment_id: Uuid,
  ) -> impl Future<Output = Result<(), NotifyError>> + Send + '_;
}

/// Default notifier: records the event in the log and nothing else.
/// Stands in until a push-delivery backend is wired up.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  async fn payment_succeeded(
    &self,
    user_id: Uuid,
    payment_id: Uuid,
  ) -> Result<(), NotifyError> {
    tracing::info!(%user_id, %payment_id, "payment success notification");
    Ok(())
  }
}
