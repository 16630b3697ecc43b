//! OAuth 2.0 Protected Resource Metadata (RFC 9728).
//!
//! MCP servers MUST implement RFC 9728 to indicate the locations of their
//! authorization servers. This module provides the metadata type and an axum
//! router that serves it, without credentials, at the well-known endpoint.
//!
//! ```rust,ignore
//! use smcp_auth::oauth::{ResourceMetadata, metadata_router};
//!
//! let metadata = ResourceMetadata {
//!     resource: "https://mcp.example.com/mcp".into(),
//!     resource_name: "Secure MCP server".into(),
//!     authorization_servers: vec!["https://login.example.com/tenant/v2.0".into()],
//!     scopes_supported: vec!["mcp:tools".into()],
//!     resource_documentation: "https://mcp.example.com/health".into(),
//!     bearer_methods_supported: Some(vec!["header".into()]),
//! };
//!
//! let app = axum::Router::new()
//!     .nest_service("/mcp", mcp_service)
//!     .merge(metadata_router(metadata));
//! ```

use axum::{Json, response::IntoResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Well-known path of the metadata document.
pub const WELL_KNOWN_PATH: &str = "/.well-known/oauth-protected-resource";

/// OAuth 2.0 Protected Resource Metadata ([RFC 9728](https://datatracker.ietf.org/doc/html/rfc9728)).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// The resource identifier, the canonical URI of this MCP endpoint.
    pub resource: String,

    /// Human-readable name of the resource.
    pub resource_name: String,

    /// Authorization server(s) that can issue tokens for this resource.
    ///
    /// MUST contain at least one entry.
    pub authorization_servers: Vec<String>,

    /// Scopes a client may request for this resource.
    pub scopes_supported: Vec<String>,

    /// URL of the resource documentation.
    pub resource_documentation: String,

    /// Bearer token methods supported (e.g., `["header"]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,
}

impl ResourceMetadata {
    /// Paths the document is served at: the bare well-known path and, when
    /// the resource has a path component, the path-suffixed form from
    /// RFC 9728 §3.1.
    pub fn well_known_paths(&self) -> Vec<String> {
        let mut paths = vec![WELL_KNOWN_PATH.to_string()];
        if let Ok(url) = url::Url::parse(&self.resource) {
            let path = url.path().trim_end_matches('/');
            if !path.is_empty() {
                paths.push(format!("{WELL_KNOWN_PATH}{path}"));
            }
        }
        paths
    }
}

/// Create an axum [`Router`](axum::Router) that serves the Protected Resource
/// Metadata as `application/json` at every path from
/// [`ResourceMetadata::well_known_paths`].
///
/// Mount this router next to the protected routes, outside the auth layer.
pub fn metadata_router(metadata: ResourceMetadata) -> axum::Router {
    let paths = metadata.well_known_paths();
    let metadata = Arc::new(metadata);
    paths.into_iter().fold(axum::Router::new(), |router, path| {
        let metadata = metadata.clone();
        router.route(
            &path,
            axum::routing::get(move || {
                let metadata = metadata.clone();
                async move { Json(metadata.as_ref().clone()).into_response() }
            }),
        )
    })
}
