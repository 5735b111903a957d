//! One-time credentials for a session: the session-wide QR payload and the
//! per-student rotating email code.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const OTP_DIGITS: u32 = 6;

/// Fresh per-student key material: 32 random bytes, hex-encoded.
pub fn new_otp_secret() -> String {
    use rand::RngCore;
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Stable textual QR payload: `course_id|strict_mode|expires_at_unix`.
///
/// The payload carries no secret; validation re-derives it from the live
/// session and compares for equality.
pub fn qr_payload(course_id: i64, strict_mode: bool, expires_at: DateTime<Utc>) -> String {
    format!("{}|{}|{}", course_id, strict_mode, expires_at.timestamp())
}

/// Splits a QR payload into `(course_id, strict_mode, expires_at_unix)`.
pub fn parse_qr_payload(payload: &str) -> Option<(i64, bool, i64)> {
    let mut parts = payload.trim().split('|');
    let course_id = parts.next()?.parse().ok()?;
    let strict_mode = parts.next()?.parse().ok()?;
    let expires_at = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((course_id, strict_mode, expires_at))
}

fn window(now: DateTime<Utc>, step_seconds: i64) -> i64 {
    now.timestamp().div_euclid(step_seconds.max(1))
}

/// HMAC-SHA256 over the big-endian window with dynamic truncation, reduced
/// to a fixed-length decimal code.
pub fn code_for_window(secret: &str, window: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key");
    mac.update(&window.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[31] & 0x0f) as usize;
    let slice = &digest[offset..offset + 4];
    let val = u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]) & 0x7fff_ffff;

    let num = val % 10u32.pow(OTP_DIGITS);
    format!("{num:06}")
}

/// Current code for `secret`, stepping once per `validity_minutes`.
pub fn current_code(secret: &str, validity_minutes: u32, now: DateTime<Utc>) -> String {
    let step = i64::from(validity_minutes).max(1) * 60;
    code_for_window(secret, window(now, step))
}

/// Accepts `submitted` if it matches the current window or any window within
/// `tolerance` steps either side (clock skew, delivery delay).
pub fn verify_code(
    secret: &str,
    validity_minutes: u32,
    submitted: &str,
    now: DateTime<Utc>,
    tolerance: i64,
) -> bool {
    let step = i64::from(validity_minutes).max(1) * 60;
    let w = window(now, step);
    for delta in -tolerance..=tolerance {
        if code_for_window(secret, w + delta) == submitted.trim() {
            return true;
        }
    }
    false
}
