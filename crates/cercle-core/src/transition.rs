//! Status-transition resolution — pure decision functions.
//!
//! A resolver maps (current status, proposed outcome) to the status the
//! subject should hold afterwards. Returning the current status means "no
//! change"; the applier compares before and after to gate side effects.

use crate::{
  event::ProposedOutcome,
  subject::{PaymentStatus, VerificationStatus},
};

/// Resolve a verification subject's next status.
///
/// Approved and Rejected are accepted from any current status, including a
/// previous terminal verdict: the provider supports re-review, and the last
/// event to arrive wins. A proposed Pending never overwrites a terminal
/// verdict. Payment outcomes cannot reach this resolver via normalization
/// and resolve to no change.
pub fn resolve_verification(
  current: VerificationStatus,
  outcome: Option<&ProposedOutcome>,
) -> VerificationStatus {
  match outcome {
    Some(ProposedOutcome::Approved) => VerificationStatus::Approved,
    Some(ProposedOutcome::Rejected { .. }) => VerificationStatus::Rejected,
    Some(ProposedOutcome::Pending) if !current.is_terminal() => {
      VerificationStatus::Pending
    }
    _ => current,
  }
}

/// Resolve a payment subject's next status.
///
/// Succeeded is accepted from any status except Succeeded itself (a late
/// success after a transient failure is honoured; a repeat success is a
/// no-op). Failed is accepted only from Pending — a settled payment is never
/// regressed by a stale failure event. Anything else resolves to no change.
pub fn resolve_payment(
  current: PaymentStatus,
  outcome: Option<&ProposedOutcome>,
) -> PaymentStatus {
  match outcome {
    Some(ProposedOutcome::Succeeded) => PaymentStatus::Succeeded,
    Some(ProposedOutcome::Failed) if current == PaymentStatus::Pending => {
      PaymentStatus::Failed
    }
    _ => current,
  }
}
