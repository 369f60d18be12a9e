//! Token identifier generation.

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// Generate a cryptographically random token identifier (`jti`).
///
/// Returns a URL-safe base64 string (43 characters, no padding) from 32 random bytes.
/// Every minted token gets its own identifier, so an access token and the
/// refresh token issued alongside it never share one.
pub fn generate_token_id() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
