//! Metrics registry for the reconciliation engine.
//!
//! An explicitly constructed registry of labeled counters and fixed-bucket
//! duration histograms, passed by `Arc` into the services that record into
//! it. Lifecycle is tied to process start/stop; nothing is global.
//!
//! `to_prometheus_format` renders the whole registry in the Prometheus text
//! exposition format for scraping.

use std::{
  collections::HashMap,
  fmt::Write as _,
  sync::RwLock,
};

/// Histogram bucket upper bounds, in seconds.
const BUCKETS: [f64; 6] = [0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

// ─── Labeled counter ─────────────────────────────────────────────────────────

/// A counter family keyed by one label value (endpoint, status, reason, …).
#[derive(Debug, Default)]
pub struct LabeledCounter {
  values: RwLock<HashMap<String, u64>>,
}

impl LabeledCounter {
  pub fn increment(&self, label: &str) {
    if let Ok(mut values) = self.values.write() {
      *values.entry(label.to_string()).or_insert(0) += 1;
    }
  }

  /// Current count for `label`; zero if never incremented.
  pub fn get(&self, label: &str) -> u64 {
    self
      .values
      .read()
      .ok()
      .and_then(|values| values.get(label).copied())
      .unwrap_or(0)
  }

  fn render(&self, out: &mut String, name: &str, label_key: &str) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let Ok(values) = self.values.read() else { return };
    let mut labels: Vec<_> = values.keys().collect();
    labels.sort();
    for label in labels {
      let count = values[label];
      let _ = writeln!(out, "{name}{{{label_key}=\"{label}\"}} {count}");
    }
  }
}

// ─── Duration histogram ──────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
struct HistogramCell {
  bucket_counts: [u64; BUCKETS.len()],
  sum:           f64,
  count:         u64,
}

/// A histogram family of operation durations, keyed by an `operation` label.
#[derive(Debug, Default)]
pub struct DurationHistogram {
  cells: RwLock<HashMap<String, HistogramCell>>,
}

impl DurationHistogram {
  pub fn observe(&self, operation: &str, seconds: f64) {
    let Ok(mut cells) = self.cells.write() else { return };
    let cell = cells.entry(operation.to_string()).or_default();
    for (i, bound) in BUCKETS.iter().enumerate() {
      if seconds <= *bound {
        cell.bucket_counts[i] += 1;
      }
    }
    cell.sum += seconds;
    cell.count += 1;
  }

  /// Total observation count for `operation`.
  pub fn count(&self, operation: &str) -> u64 {
    self
      .cells
      .read()
      .ok()
      .and_then(|cells| cells.get(operation).map(|c| c.count))
      .unwrap_or(0)
  }

  fn render(&self, out: &mut String, name: &str) {
    let _ = writeln!(out, "# TYPE {name} histogram");
    let Ok(cells) = self.cells.read() else { return };
    let mut operations: Vec<_> = cells.keys().collect();
    operations.sort();
    for operation in operations {
      let cell = &cells[operation];
      for (i, bound) in BUCKETS.iter().enumerate() {
        let _ = writeln!(
          out,
          "{name}_bucket{{operation=\"{operation}\",le=\"{bound}\"}} {}",
          cell.bucket_counts[i]
        );
      }
      let _ = writeln!(
        out,
        "{name}_bucket{{operation=\"{operation}\",le=\"+Inf\"}} {}",
        cell.count
      );
      let _ = writeln!(
        out,
        "{name}_sum{{operation=\"{operation}\"}} {}",
        cell.sum
      );
      let _ = writeln!(
        out,
        "{name}_count{{operation=\"{operation}\"}} {}",
        cell.count
      );
    }
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// All counter/histogram families emitted by the engine. One family set for
/// verification, one for payments, plus the unhandled-event-type counter.
#[derive(Debug, Default)]
pub struct Metrics {
  // Verification
  pub kyc_requests_total:       LabeledCounter,
  pub kyc_success_total:        LabeledCounter,
  pub kyc_failure_total:        LabeledCounter,
  pub kyc_duration_seconds:     DurationHistogram,

  // Payments
  pub payments_total:           LabeledCounter,
  pub payments_success_total:   LabeledCounter,
  pub payments_failure_total:   LabeledCounter,
  pub payments_duration_seconds: DurationHistogram,

  /// Acknowledged-but-unmodeled webhook event types, by source.
  pub webhook_unhandled_total:  LabeledCounter,
}

impl Metrics {
  pub fn new() -> Self { Self::default() }

  /// Render every family in the Prometheus text exposition format.
  pub fn to_prometheus_format(&self) -> String {
    let mut out = String::new();
    self
      .kyc_requests_total
      .render(&mut out, "kyc_requests_total", "endpoint");
    self
      .kyc_success_total
      .render(&mut out, "kyc_success_total", "status");
    self
      .kyc_failure_total
      .render(&mut out, "kyc_failure_total", "reason");
    self
      .kyc_duration_seconds
      .render(&mut out, "kyc_duration_seconds");
    self
      .payments_total
      .render(&mut out, "payments_total", "status");
    self
      .payments_success_total
      .render(&mut out, "payments_success_total", "status");
    self
      .payments_failure_total
      .render(&mut out, "payments_failure_total", "reason");
    self
      .payments_duration_seconds
      .render(&mut out, "payments_duration_seconds");
    self
      .webhook_unhandled_total
      .render(&mut out, "webhook_unhandled_total", "source");
    out
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
