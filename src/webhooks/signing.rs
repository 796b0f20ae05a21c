//! HMAC-SHA256 payload signing.
//!
//! Receivers recompute the signature over the raw request body with
//! their webhook secret and compare against the `X-Rendr-Signature`
//! header (`sha256=<hex>`).

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix for webhook signing secrets
pub const WEBHOOK_SECRET_PREFIX: &str = "whsec_";

/// Generates a webhook signing secret with 256 bits of entropy.
pub fn generate_webhook_secret() -> String {
    let mut secret_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret_bytes);

    format!(
        "{}{}",
        WEBHOOK_SECRET_PREFIX,
        general_purpose::URL_SAFE_NO_PAD.encode(secret_bytes)
    )
}

/// Hex HMAC-SHA256 of the payload under the given secret.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hex signature.
pub fn verify_signature(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}
