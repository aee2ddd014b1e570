//! Webhook signature verification.
//!
//! Both providers authenticate deliveries with an HMAC-SHA256 over the exact
//! raw request bytes; they differ only in how the digest is carried. The
//! identity provider sends a bare hex digest; the payment provider sends a
//! `t=<ts>,v1=<hex>` header and signs `"{ts}.{body}"`.
//!
//! Verification is a pure function of (payload, header, secret). It returns
//! `false` rather than erroring on absent or undecodable input, and compares
//! digests in constant time via [`Mac::verify_slice`].

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Whether inbound webhook signatures are checked.
///
/// `Bypassed` accepts every delivery and exists for local development only.
/// It must be set explicitly in configuration; the default is `Enforced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureVerificationMode {
  #[default]
  Enforced,
  Bypassed,
}

/// How a provider carries its HMAC digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
  /// Bare hex digest of the raw body (identity provider).
  HexDigest,
  /// `t=<ts>,v1=<hex>` over `"{ts}.{body}"` (payment provider).
  Stamped,
}

/// A configured verifier for one webhook source.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
  secret: String,
  scheme: SignatureScheme,
  mode:   SignatureVerificationMode,
}

impl WebhookVerifier {
  pub fn new(
    secret: impl Into<String>,
    scheme: SignatureScheme,
    mode: SignatureVerificationMode,
  ) -> Self {
    Self { secret: secret.into(), scheme, mode }
  }

  /// Check `header` against `payload`. Always true in `Bypassed` mode.
  pub fn verify(&self, payload: &[u8], header: &str) -> bool {
    match self.mode {
      SignatureVerificationMode::Bypassed => true,
      SignatureVerificationMode::Enforced => match self.scheme {
        SignatureScheme::HexDigest => {
          verify_hex_hmac(payload, header, &self.secret)
        }
        SignatureScheme::Stamped => {
          verify_stamped_hmac(payload, header, &self.secret)
        }
      },
    }
  }
}

// ─── Verification primitives ─────────────────────────────────────────────────

/// Verify a bare hex-encoded HMAC-SHA256 digest of `payload`.
pub fn verify_hex_hmac(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
  if signature_hex.is_empty() || secret.is_empty() {
    return false;
  }
  let Ok(provided) = hex::decode(signature_hex.trim()) else {
    return false;
  };
  let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(payload);
  mac.verify_slice(&provided).is_ok()
}

/// Verify a `t=<ts>,v1=<hex>` header where the digest covers `"{ts}.{body}"`.
///
/// The header may carry several `v1` entries (the provider does this during
/// secret rotation); any one matching is sufficient.
pub fn verify_stamped_hmac(payload: &[u8], header: &str, secret: &str) -> bool {
  if header.is_empty() || secret.is_empty() {
    return false;
  }

  let mut timestamp: Option<&str> = None;
  let mut candidates: Vec<&str> = Vec::new();
  for part in header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", value)) => timestamp = Some(value),
      Some(("v1", value)) => candidates.push(value),
      _ => {}
    }
  }

  let Some(ts) = timestamp else {
    return false;
  };
  if candidates.is_empty() {
    return false;
  }

  candidates.iter().any(|candidate| {
    let Ok(provided) = hex::decode(candidate) else {
      return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
      return false;
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
  })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
