//! Authentication and authorization outcomes.
//!
//! Every rejection the gate can produce is an [`AuthError`]. Each one maps to
//! exactly one [`Reason`] and one HTTP status, so the transport never has to
//! guess how to answer a failed request.

use http::StatusCode;
use thiserror::Error;

/// Why a request was allowed or denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    /// No bearer token was presented.
    MissingToken,
    /// The token was malformed, mis-signed, from the wrong issuer or for the
    /// wrong audience, or could not be checked in time.
    InvalidToken,
    /// The token was well formed but its expiry is in the past.
    ExpiredToken,
    /// The token is valid but does not carry the required delegated scope.
    MissingScope,
    /// Authenticated and authorized.
    Allowed,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::MissingToken => "missing_token",
            Reason::InvalidToken => "invalid_token",
            Reason::ExpiredToken => "expired_token",
            Reason::MissingScope => "missing_scope",
            Reason::Allowed => "allowed",
        }
    }
}

/// Per-request verdict of the authentication and authorization gates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: Reason,
}

impl AuthorizationDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: Reason::Allowed,
        }
    }

    pub fn deny(reason: Reason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    /// 401 for the authentication class, 403 for the authorization class.
    pub fn status(&self) -> StatusCode {
        match self.reason {
            Reason::Allowed => StatusCode::OK,
            Reason::MissingScope => StatusCode::FORBIDDEN,
            Reason::MissingToken | Reason::InvalidToken | Reason::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
        }
    }
}

/// Detail behind an [`AuthError::InvalidToken`].
///
/// Only ever logged server side. Callers see the generic `invalid_token`
/// challenge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidToken {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("no signing key with kid `{0}`")]
    UnknownKey(String),
    #[error("signature verification failed")]
    Signature,
    #[error("issuer mismatch")]
    Issuer,
    #[error("audience mismatch")]
    Audience,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
    #[error("validation timed out")]
    Timeout,
}

/// A rejected request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] InvalidToken),
    #[error("token has expired")]
    ExpiredToken,
    #[error("insufficient scope: `{required}` is required")]
    MissingScope { required: String },
}

impl AuthError {
    pub fn reason(&self) -> Reason {
        match self {
            AuthError::MissingToken => Reason::MissingToken,
            AuthError::InvalidToken(_) => Reason::InvalidToken,
            AuthError::ExpiredToken => Reason::ExpiredToken,
            AuthError::MissingScope { .. } => Reason::MissingScope,
        }
    }

    pub fn decision(&self) -> AuthorizationDecision {
        AuthorizationDecision::deny(self.reason())
    }

    pub fn status(&self) -> StatusCode {
        self.decision().status()
    }

    /// Message safe to hand back to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing bearer token",
            AuthError::InvalidToken(_) => "invalid access token",
            AuthError::ExpiredToken => "access token has expired",
            AuthError::MissingScope { .. } => "insufficient scope",
        }
    }
}
