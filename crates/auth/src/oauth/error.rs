//! OAuth 2.1 error responses for MCP resource servers.
//!
//! Builds `WWW-Authenticate` challenges as required by
//! [RFC 6750 §3](https://datatracker.ietf.org/doc/html/rfc6750#section-3),
//! pointing clients at the Protected Resource Metadata document.

use axum::{Json, response::IntoResponse};
use http::{HeaderValue, StatusCode};
use serde_json::json;

use crate::decision::AuthError;

/// Configuration for an MCP server acting as an OAuth 2.1 resource server.
#[derive(Clone, Debug)]
pub struct ResourceServerConfig {
    /// URL of the Protected Resource Metadata document (RFC 9728).
    pub resource_metadata_url: String,
    /// Scope advertised in 401 challenges.
    pub default_scope: Option<String>,
}

/// Build a `WWW-Authenticate` header value for a 401 Unauthorized response.
///
/// Format: `Bearer resource_metadata="<url>"[, scope="<scopes>"]`
pub fn www_authenticate_401(config: &ResourceServerConfig) -> HeaderValue {
    let mut value = format!(
        "Bearer resource_metadata=\"{}\"",
        config.resource_metadata_url,
    );
    if let Some(ref scope) = config.default_scope {
        value.push_str(&format!(", scope=\"{scope}\""));
    }
    header(value)
}

/// Build a `WWW-Authenticate` header value for a rejected token.
///
/// Format: `Bearer error="invalid_token", error_description="<msg>", resource_metadata="<url>"`
pub fn www_authenticate_invalid(config: &ResourceServerConfig, description: &str) -> HeaderValue {
    header(format!(
        "Bearer error=\"invalid_token\", error_description=\"{description}\", resource_metadata=\"{}\"",
        config.resource_metadata_url,
    ))
}

/// Build a `WWW-Authenticate` header value for a 403 Forbidden response
/// with `insufficient_scope` error.
///
/// Format: `Bearer error="insufficient_scope", scope="<required>", resource_metadata="<url>"`
pub fn www_authenticate_403(config: &ResourceServerConfig, required_scope: &str) -> HeaderValue {
    header(format!(
        "Bearer error=\"insufficient_scope\", scope=\"{required_scope}\", resource_metadata=\"{}\"",
        config.resource_metadata_url,
    ))
}

fn header(value: String) -> HeaderValue {
    // Scopes and URLs come from validated configuration; fall back to a bare
    // challenge rather than panicking on an unexpected byte.
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
}

/// The challenge matching an [`AuthError`].
pub fn challenge(err: &AuthError, config: &ResourceServerConfig) -> HeaderValue {
    match err {
        AuthError::MissingToken => www_authenticate_401(config),
        AuthError::InvalidToken(_) | AuthError::ExpiredToken => {
            www_authenticate_invalid(config, err.public_message())
        }
        AuthError::MissingScope { required } => www_authenticate_403(config, required),
    }
}

/// Build the HTTP response for a rejected request.
///
/// The body is a JSON-RPC error with a null id, since the request was never
/// parsed. Validation detail stays out of it.
pub fn auth_error_response(
    err: &AuthError,
    config: Option<&ResourceServerConfig>,
) -> axum::response::Response {
    let body = json!({
        "jsonrpc": "2.0",
        "error": {
            "code": -32001,
            "message": err.public_message(),
        },
        "id": null,
    });
    let status = err.decision().status();
    let mut response = (status, Json(body)).into_response();
    if let Some(config) = config {
        response
            .headers_mut()
            .insert(http::header::WWW_AUTHENTICATE, challenge(err, config));
    } else if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(http::header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}
