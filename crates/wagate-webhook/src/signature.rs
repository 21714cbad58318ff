// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 payload signing.
//!
//! The signature covers the exact serialized payload bytes as sent, encoded
//! as lowercase hex behind a `sha256=` prefix. Verification splits at `=`,
//! checks the algorithm tag, and compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase-hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// The `X-Signature` header value: `sha256=<hex>`.
pub fn signature_header(payload: &[u8], secret: &str) -> String {
    format!("sha256={}", sign(payload, secret))
}

/// Verifies a `sha256=<hex>` header against the payload bytes.
pub fn verify(payload: &[u8], secret: &str, header: &str) -> bool {
    let Some((algorithm, hex_sig)) = header.split_once('=') else {
        return false;
    };
    if algorithm != "sha256" {
        return false;
    }
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
