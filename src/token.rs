//! QR token codec (spec.md §4.A / §6).
//!
//! Wire format: ASCII `P.U.E.S` where `S` is the first 32 hex characters
//! (128 bits) of `HMAC-SHA256(secret, "P.U.E")`. Pure — no state lookup,
//! no time check. Grounded on the HMAC-over-ASCII-fields pattern used for
//! IPC message authentication elsewhere in this corpus (see
//! `hmac::{Hmac, Mac}` + `sha2::Sha256` usage in the security/auth modules
//! of the retrieved pack), adapted from the symmetric scheme in
//! `original_source/backend/crypto.py::make_qr_token`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Truncated MAC length in hex characters (128 bits).
const MAC_HEX_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedToken {
    pub pass_id: u64,
    pub subject_id: u64,
    pub expiry_unix: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenError {
    /// Not exactly four dot-separated fields, or a field failed to parse,
    /// or the signature field is not exactly 32 lowercase hex characters.
    Structural,
    /// Structurally well-formed but the MAC does not match.
    SignatureMismatch,
}

fn mac_hex(secret: &[u8], pass_id: u64, subject_id: u64, expiry_unix: i64) -> String {
    let data = format!("{pass_id}.{subject_id}.{expiry_unix}");
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    let full = mac.finalize().into_bytes();
    let mut hex = String::with_capacity(MAC_HEX_LEN);
    for byte in full.iter().take(MAC_HEX_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Mint a token for `(pass_id, subject_id)` expiring at `expiry_unix`
/// (seconds since the Unix epoch).
pub fn mint(secret: &[u8], pass_id: u64, subject_id: u64, expiry_unix: i64) -> String {
    let sig = mac_hex(secret, pass_id, subject_id, expiry_unix);
    format!("{pass_id}.{subject_id}.{expiry_unix}.{sig}")
}

/// Parse the wire format into its four fields without touching the secret.
/// A non-four-field input, a non-decimal field, or a signature field not
/// exactly 32 hex characters is structurally invalid.
pub fn parse(token: &str) -> Result<ParsedToken, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 4 {
        return Err(TokenError::Structural);
    }
    let [p, u, e, s] = [parts[0], parts[1], parts[2], parts[3]];
    if s.len() != MAC_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
    {
        return Err(TokenError::Structural);
    }
    let pass_id: u64 = p.parse().map_err(|_| TokenError::Structural)?;
    let subject_id: u64 = u.parse().map_err(|_| TokenError::Structural)?;
    let expiry_unix: i64 = e.parse().map_err(|_| TokenError::Structural)?;
    if !is_canonical_decimal(p, pass_id) || !is_canonical_decimal(u, subject_id) {
        return Err(TokenError::Structural);
    }
    Ok(ParsedToken {
        pass_id,
        subject_id,
        expiry_unix,
    })
}

fn is_canonical_decimal(field: &str, value: u64) -> bool {
    // No leading zeros except for the literal value 0.
    field == value.to_string()
}

/// Parse and verify in one step: recompute the MAC over `P.U.E` with the
/// shared secret and compare in constant time (via `hmac::Mac::verify_slice`,
/// which uses a timing-safe comparison internally).
pub fn parse_and_verify(secret: &[u8], token: &str) -> Result<ParsedToken, TokenError> {
    let parsed = parse(token)?;
    let data = format!(
        "{}.{}.{}",
        parsed.pass_id, parsed.subject_id, parsed.expiry_unix
    );
    let sig_hex = token.rsplit('.').next().expect("parse already validated 4 fields");
    let sig_bytes = hex_decode(sig_hex).ok_or(TokenError::Structural)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    let full = mac.finalize().into_bytes();
    // Constant-time compare against the first 16 bytes (128 bits) of the MAC.
    if !constant_time_eq(&full[..sig_bytes.len()], &sig_bytes) {
        return Err(TokenError::SignatureMismatch);
    }
    Ok(parsed)
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!";

    #[test]
    fn round_trip_verifies() {
        let tok = mint(SECRET, 7, 42, 1_700_000_900);
        let parsed = parse_and_verify(SECRET, &tok).unwrap();
        assert_eq!(parsed.pass_id, 7);
        assert_eq!(parsed.subject_id, 42);
        assert_eq!(parsed.expiry_unix, 1_700_000_900);
    }

    #[test]
    fn tampered_pass_id_fails_mac() {
        let tok = mint(SECRET, 7, 42, 1_700_000_900);
        let mut parts: Vec<&str> = tok.split('.').collect();
        let bumped = "8".to_string();
        parts[0] = &bumped;
        let forged = parts.join(".");
        assert_eq!(
            parse_and_verify(SECRET, &forged),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn wrong_field_count_is_structural() {
        assert_eq!(parse("1.2.3"), Err(TokenError::Structural));
        assert_eq!(parse("1.2.3.4.5"), Err(TokenError::Structural));
    }

    #[test]
    fn non_decimal_field_is_structural() {
        assert_eq!(parse("x.2.3.0000000000000000000000000000000a"), Err(TokenError::Structural));
    }

    #[test]
    fn leading_zero_is_structural() {
        let tok = mint(SECRET, 7, 42, 1_700_000_900);
        let bad = tok.replacen("7.", "07.", 1);
        assert_eq!(parse(&bad), Err(TokenError::Structural));
    }

    #[test]
    fn wrong_mac_length_is_structural() {
        assert_eq!(parse("1.2.3.abcd"), Err(TokenError::Structural));
    }

    #[test]
    fn different_secrets_disagree() {
        let tok = mint(SECRET, 1, 1, 1_700_000_000);
        let other = b"a-totally-different-secret-value";
        assert_eq!(
            parse_and_verify(other, &tok),
            Err(TokenError::SignatureMismatch)
        );
    }
}
