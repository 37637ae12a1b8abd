//! Small stateless helpers shared across modules.

use rand::RngCore;

use crate::protocol_constants::API_TOKEN_BYTES;

/// Current Unix time in milliseconds.
pub fn now_unix_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Generates a cryptographically random per-process API token, hex-encoded.
///
/// Called once at boot; the resulting string must be supplied in the
/// `x-api-token` header on mutating requests to the loopback control
/// surface.
pub fn generate_api_token() -> String {
    let mut bytes = [0u8; API_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique_and_correct_length() {
        let a = generate_api_token();
        let b = generate_api_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), API_TOKEN_BYTES * 2);
    }

    #[test]
    fn now_unix_millis_is_nonzero() {
        assert!(now_unix_millis() > 0);
    }
}
