//! JWT bearer token validation.
//!
//! Verifies signature, issuer, audience and expiry of a JWT against keys
//! from a [`KeySource`], producing an [`AccessToken`]. Each failure maps to a
//! distinct [`AuthError`]; nothing downgrades to success.
//!
//! ```rust,ignore
//! use smcp_auth::jwt::JwtValidator;
//!
//! let validator = JwtValidator::from_jwks_url(
//!     "https://login.microsoftonline.com/<tenant>/discovery/v2.0/keys",
//! )
//! .issuer("https://login.microsoftonline.com/<tenant>/v2.0")
//! .audience("https://mcp.example.com/mcp")
//! .build()?;
//! ```

use anyhow::{Result, bail};
use jsonwebtoken::{TokenData, Validation, decode, decode_header, errors::ErrorKind};
use serde_json::{Map, Value};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    Validator,
    decision::{AuthError, InvalidToken},
    keys::{CachePolicy, JwksSource, KeyCache, KeySource},
    token::{AccessToken, Claims},
};

/// Builder for [`JwtValidator`].
pub struct JwtValidatorBuilder<S> {
    source: S,
    issuer: Option<String>,
    audiences: Vec<String>,
    policy: CachePolicy,
    timeout: Duration,
}

impl<S: KeySource> JwtValidatorBuilder<S> {
    /// Require the `iss` claim to equal this value.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Accept tokens whose `aud` contains this value. May be called more
    /// than once.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Key cache TTL and refresh pacing.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound on a whole validation, key fetch included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<JwtValidator<S>> {
        let Some(issuer) = self.issuer else {
            bail!("JWT validator requires an issuer");
        };
        if self.audiences.is_empty() {
            bail!("JWT validator requires at least one audience");
        }

        // Expiry is checked after issuer and audience so an expired token
        // for the wrong audience still reports the audience mismatch.
        let mut validation = Validation::default();
        validation.set_issuer(&[issuer]);
        validation.set_audience(&self.audiences);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_exp = false;
        validation.validate_nbf = true;

        Ok(JwtValidator {
            inner: Arc::new(JwtValidatorInner {
                keys: KeyCache::new(self.source, self.policy),
                validation,
                timeout: self.timeout,
            }),
        })
    }
}

struct JwtValidatorInner<S> {
    keys: KeyCache<S>,
    validation: Validation,
    timeout: Duration,
}

/// JWT validator backed by a cached key set.
pub struct JwtValidator<S = JwksSource> {
    inner: Arc<JwtValidatorInner<S>>,
}

impl<S> Clone for JwtValidator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl JwtValidator<JwksSource> {
    /// Start building a validator that fetches keys from a JWKS URL.
    pub fn from_jwks_url(url: impl Into<String>) -> JwtValidatorBuilder<JwksSource> {
        Self::with_source(JwksSource::new(url))
    }
}

impl<S: KeySource> JwtValidator<S> {
    pub fn with_source(source: S) -> JwtValidatorBuilder<S> {
        JwtValidatorBuilder {
            source,
            issuer: None,
            audiences: Vec::new(),
            policy: CachePolicy::default(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Fetch the key set ahead of the first request.
    pub async fn warm(&self) -> Result<usize, crate::keys::KeyError> {
        self.inner.keys.refresh().await
    }

    async fn verify(&self, token: &str) -> Result<AccessToken, AuthError> {
        let header = decode_header(token)
            .map_err(|e| InvalidToken::Malformed(format!("invalid JWT header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| InvalidToken::Malformed("JWT missing kid header".into()))?;
        let key = self
            .inner
            .keys
            .get(&kid)
            .await
            .map_err(InvalidToken::from)?;

        let mut validation = self.inner.validation.clone();
        validation.algorithms = vec![key.algorithm];
        let data: TokenData<Map<String, Value>> =
            decode(token, &key.key, &validation).map_err(|e| classify(e.kind()))?;

        let token = AccessToken::from_claims(Claims::new(data.claims));
        if token.is_expired_at(now()) {
            return Err(AuthError::ExpiredToken);
        }
        Ok(token)
    }
}

impl<S: KeySource> Validator for JwtValidator<S> {
    async fn validate(&self, token: &str) -> Result<AccessToken, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        match tokio::time::timeout(self.inner.timeout, self.verify(token)).await {
            Ok(result) => result,
            Err(_) => Err(InvalidToken::Timeout.into()),
        }
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    let invalid = match kind {
        ErrorKind::ExpiredSignature => return AuthError::ExpiredToken,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidKeyFormat => InvalidToken::Signature,
        ErrorKind::InvalidIssuer => InvalidToken::Issuer,
        ErrorKind::InvalidAudience => InvalidToken::Audience,
        ErrorKind::ImmatureSignature => InvalidToken::NotYetValid,
        ErrorKind::MissingRequiredClaim(claim) => {
            InvalidToken::Malformed(format!("missing `{claim}` claim"))
        }
        other => InvalidToken::Malformed(format!("{other:?}")),
    };
    AuthError::InvalidToken(invalid)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
