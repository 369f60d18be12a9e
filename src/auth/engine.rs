//! Session lifecycle: login, logout, and per-request validation with
//! refresh-token rotation.
//!
//! Access tokens are verified statelessly. Refresh tokens are single-use: each
//! successful rotation consumes the presented refresh credential and activates
//! exactly one new one, in a single atomic store operation. A refresh token
//! that verifies cryptographically but is absent or revoked in the store is a
//! reuse signal and is logged as such.

use crate::auth::password::{dummy_verifier, verify_password};
use crate::auth::token::{Claims, TokenCodec, TokenError, TokenPurpose};
use crate::models::{now_secs, RenewalCredential};
use crate::storage::{CredentialStore, StoreError, UserDirectory};
use std::sync::Arc;

/// Engine failures. The HTTP layer collapses every token-related variant into
/// the same 401.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No token presented")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Refresh credential revoked or absent")]
    CredentialRevokedOrAbsent,

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => SessionError::InvalidToken,
            TokenError::Signing(msg) => SessionError::Internal(msg),
        }
    }
}

/// A minted bearer string together with the claims it encodes.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub claims: Claims,
}

/// Access and refresh token issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub renewal: IssuedToken,
}

/// Outcome of a successful [`SessionEngine::validate`].
#[derive(Debug)]
pub struct Validated {
    pub user_id: String,
    /// Present when the request was authorized by rotating the refresh token.
    pub rotated: Option<TokenPair>,
}

/// Orchestrates the token codec, credential store, and user directory.
pub struct SessionEngine {
    codec: TokenCodec,
    credentials: Arc<dyn CredentialStore>,
    users: Arc<dyn UserDirectory>,
    access_ttl_secs: i64,
    renewal_ttl_secs: i64,
}

impl SessionEngine {
    pub fn new(
        codec: TokenCodec,
        credentials: Arc<dyn CredentialStore>,
        users: Arc<dyn UserDirectory>,
        access_ttl_secs: i64,
        renewal_ttl_secs: i64,
    ) -> Self {
        Self {
            codec,
            credentials,
            users,
            access_ttl_secs,
            renewal_ttl_secs,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    fn mint_pair(&self, user_id: &str) -> Result<TokenPair, SessionError> {
        let (access, access_claims) =
            self.codec
                .mint(user_id, TokenPurpose::Access, self.access_ttl_secs)?;
        let (renewal, renewal_claims) =
            self.codec
                .mint(user_id, TokenPurpose::Renewal, self.renewal_ttl_secs)?;

        Ok(TokenPair {
            access: IssuedToken {
                value: access,
                claims: access_claims,
            },
            renewal: IssuedToken {
                value: renewal,
                claims: renewal_claims,
            },
        })
    }

    /// Verify email + password and issue a fresh token pair.
    ///
    /// The new refresh credential replaces all earlier ones of the user in a
    /// single store operation, so at most one refresh credential per user is
    /// active afterwards even when logins overlap. If that replacement fails
    /// the credential is inserted on its own; only a failed insert fails the
    /// login. The pair is returned only once its refresh credential is stored.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, SessionError> {
        let user = self.users.find_by_email(email).await?;

        // Unknown users are checked against a dummy verifier to keep timing uniform
        let verifier = match &user {
            Some(user) => user.password_hash.clone(),
            None => dummy_verifier().to_string(),
        };
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &verifier))
            .await
            .map_err(|e| SessionError::Internal(format!("Password check panicked: {}", e)))?;

        let user = match user {
            Some(user) if matches => user,
            Some(user) => {
                tracing::warn!(action = "login_failed", user_id = %user.id, "Invalid credentials");
                return Err(SessionError::InvalidCredentials);
            }
            None => {
                tracing::warn!(action = "login_failed", "Invalid credentials");
                return Err(SessionError::InvalidCredentials);
            }
        };

        let pair = self.mint_pair(&user.id)?;

        let credential = RenewalCredential::new(
            &user.id,
            &pair.renewal.claims.jti,
            pair.renewal.claims.exp,
        );
        if let Err(e) = self.credentials.replace_for_user(&credential).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to clear previous refresh credentials");
            self.credentials.insert(&credential).await?;
        }

        tracing::info!(action = "login_success", user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Forget the refresh credential behind `renewal_token`, if any.
    ///
    /// Never fails. An absent or undecodable token is ignored and store errors
    /// are only logged.
    pub async fn logout(&self, renewal_token: Option<&str>) {
        let Some(token) = renewal_token else {
            return;
        };

        match self.codec.decode(token, TokenPurpose::Renewal) {
            Ok(claims) => self.discard_renewal(&claims.jti).await,
            Err(_) => tracing::debug!("Logout with undecodable refresh token"),
        }
    }

    /// Delete a refresh credential by token id, logging store errors.
    pub async fn discard_renewal(&self, token_id: &str) {
        if let Err(e) = self.credentials.delete(token_id).await {
            tracing::warn!(error = %e, "Failed to delete refresh credential");
        }
    }

    /// Authorize a request from its access and refresh tokens.
    ///
    /// A valid access token is sufficient on its own. Otherwise the refresh
    /// token is rotated and the new pair is returned in [`Validated::rotated`].
    pub async fn validate(
        &self,
        access_token: Option<&str>,
        renewal_token: Option<&str>,
    ) -> Result<Validated, SessionError> {
        if let Some(token) = access_token {
            match self.codec.decode(token, TokenPurpose::Access) {
                Ok(claims) => {
                    return Ok(Validated {
                        user_id: claims.sub,
                        rotated: None,
                    })
                }
                Err(_) => tracing::debug!("Access token rejected, attempting rotation"),
            }
        }

        let renewal_token = renewal_token.ok_or(SessionError::MissingToken)?;
        let (user_id, pair) = self.rotate(renewal_token).await?;

        Ok(Validated {
            user_id,
            rotated: Some(pair),
        })
    }

    /// Exchange a refresh token for a new token pair, consuming it.
    ///
    /// Returns the subject user id and the new pair.
    pub async fn rotate(&self, renewal_token: &str) -> Result<(String, TokenPair), SessionError> {
        let claims = self.codec.decode(renewal_token, TokenPurpose::Renewal)?;
        let now = now_secs();

        let stored = self.credentials.find_valid(&claims.jti, now).await?;
        match stored {
            Some(ref credential) if credential.user_id == claims.sub => {}
            _ => {
                tracing::warn!(
                    action = "renewal_reuse",
                    user_id = %claims.sub,
                    "Refresh token verified but its credential is revoked or absent"
                );
                return Err(SessionError::CredentialRevokedOrAbsent);
            }
        }

        let pair = self.mint_pair(&claims.sub)?;
        let next = RenewalCredential::new(
            &claims.sub,
            &pair.renewal.claims.jti,
            pair.renewal.claims.exp,
        );

        // Conditional on the old row still being active: a concurrent
        // rotation of the same token makes this return false.
        if !self.credentials.rotate(&claims.jti, &next, now).await? {
            tracing::warn!(
                action = "renewal_reuse",
                user_id = %claims.sub,
                "Refresh credential consumed by a concurrent rotation"
            );
            return Err(SessionError::CredentialRevokedOrAbsent);
        }

        tracing::info!(action = "rotation", user_id = %claims.sub, "Rotated refresh token");
        Ok((claims.sub, pair))
    }
}
