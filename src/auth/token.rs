//! Signed, time-bound access and refresh tokens.
//!
//! Tokens are HS256 JWTs carrying `{ sub, jti, iat, exp }`. Access and refresh
//! tokens are signed with independent secrets, so a token of one kind never
//! verifies as the other even though the claim layout is identical.

use crate::auth::session::generate_token_id;
use crate::models::now_secs;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Which secret a token is signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Access,
    Renewal,
}

/// Claim set carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user id.
    pub sub: String,
    /// Unique per minted token.
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

/// Token failures.
///
/// Every decode failure is reported as `Invalid`; the cause is not carried.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Mints and decodes tokens for both purposes.
pub struct TokenCodec {
    access: Keys,
    renewal: Keys,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access", &"[REDACTED]")
            .field("renewal", &"[REDACTED]")
            .finish()
    }
}

impl TokenCodec {
    pub fn new(access_secret: &[u8], renewal_secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: Keys::from_secret(access_secret),
            renewal: Keys::from_secret(renewal_secret),
            validation,
        }
    }

    fn keys(&self, purpose: TokenPurpose) -> &Keys {
        match purpose {
            TokenPurpose::Access => &self.access,
            TokenPurpose::Renewal => &self.renewal,
        }
    }

    /// Mint a token for `subject` expiring `ttl_secs` from now.
    ///
    /// A negative TTL produces a token that is already expired.
    pub fn mint(
        &self,
        subject: &str,
        purpose: TokenPurpose,
        ttl_secs: i64,
    ) -> Result<(String, Claims), TokenError> {
        let now = now_secs();
        let exp = (now as i64).saturating_add(ttl_secs).max(0) as u64;

        let claims = Claims {
            sub: subject.to_string(),
            jti: generate_token_id(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(purpose).encoding,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok((token, claims))
    }

    /// Verify `token` against the secret for `purpose` and return its claims.
    pub fn decode(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &self.keys(purpose).decoding,
            &self.validation,
        )
        .map_err(|_| TokenError::Invalid)?;

        // Expiry is re-checked here rather than trusting the library's window
        if data.claims.exp <= now_secs() {
            return Err(TokenError::Invalid);
        }

        Ok(data.claims)
    }
}
