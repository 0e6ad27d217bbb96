//! HMAC-SHA256 verification of webhook bodies.
//!
//! Header format: `X-Webhook-Signature: sha256=<hex>`. Comparison is
//! constant-time via `subtle`.

use super::payload::PayloadError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Shared-secret verifier. The secret is never logged.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Verify `header` against the HMAC of `payload`.
    ///
    /// # Errors
    /// `PayloadError::Signature` when the header is missing, malformed or wrong.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), PayloadError> {
        let signature_hex = header
            .and_then(|h| h.trim().strip_prefix("sha256="))
            .ok_or(PayloadError::Signature)?;
        let expected = hex::decode(signature_hex).map_err(|_| PayloadError::Signature)?;

        let computed = self.compute(payload)?;
        if computed.ct_eq(&expected).into() {
            Ok(())
        } else {
            tracing::warn!("webhook signature verification failed");
            Err(PayloadError::Signature)
        }
    }

    /// Header value for `payload`; used by partners' test harnesses and our tests.
    pub fn sign(&self, payload: &[u8]) -> Result<String, PayloadError> {
        Ok(format!("sha256={}", hex::encode(self.compute(payload)?)))
    }

    fn compute(&self, payload: &[u8]) -> Result<Vec<u8>, PayloadError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| PayloadError::Signature)?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
