//! The Cercle reconciliation engine.
//!
//! Two services over any [`cercle_core::store::SubjectStore`]:
//!
//! - [`reconcile::Reconciler`] applies authenticated provider webhooks onto
//!   subject records as idempotent status transitions;
//! - [`lifecycle::Lifecycle`] owns the initiation flows (start verification,
//!   create payment) and the client-facing status reads.
//!
//! Both take an explicitly constructed [`metrics::Metrics`] registry at
//! construction time; there is no ambient global state.

#![allow(async_fn_in_trait)]

pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod reconcile;

pub use error::{Error, Result};
