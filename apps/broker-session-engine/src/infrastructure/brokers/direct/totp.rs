//! RFC 6238 time-based one-time passwords (HMAC-SHA1, 30 s step, 6 digits).

use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Step length in seconds.
pub const TOTP_STEP_SECS: u64 = 30;

/// Number of digits in a code.
pub const TOTP_DIGITS: u32 = 6;

/// TOTP generation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TotpError {
    /// Secret is not valid base32.
    #[error("TOTP secret is not valid base32")]
    InvalidSecret,
}

/// Code for the step containing `unix_secs`.
///
/// # Errors
///
/// Returns `TotpError::InvalidSecret` if `secret_base32` does not decode.
pub fn generate(secret_base32: &str, unix_secs: u64) -> Result<String, TotpError> {
    let key = decode_base32(secret_base32).ok_or(TotpError::InvalidSecret)?;
    if key.is_empty() {
        return Err(TotpError::InvalidSecret);
    }
    hotp(&key, unix_secs / TOTP_STEP_SECS)
}

/// Code for the current step.
///
/// # Errors
///
/// Returns `TotpError::InvalidSecret` if `secret_base32` does not decode.
pub fn current(secret_base32: &str) -> Result<String, TotpError> {
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    generate(secret_base32, now)
}

fn hotp(key: &[u8], counter: u64) -> Result<String, TotpError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|_| TotpError::InvalidSecret)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let code = binary % 10u32.pow(TOTP_DIGITS);
    Ok(format!("{code:0width$}", width = TOTP_DIGITS as usize))
}

/// RFC 4648 base32, case-insensitive, padding and spaces ignored.
fn decode_base32(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits: u32 = 0;

    for c in input.chars().filter(|c| !c.is_whitespace() && *c != '=' && *c != '-') {
        let value = match c.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u8 - b'A',
            c @ '2'..='7' => c as u8 - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Some(out)
}
