//! Finalized startup configuration.
//!
//! Every per-deployment value is resolved once into a [`ServerConfig`] and
//! handed by reference to the components that need it. Nothing here reads
//! the environment; that belongs to the binary.

use smcp_auth::{
    keys::CachePolicy,
    oauth::{ResourceMetadata, ResourceServerConfig, WELL_KNOWN_PATH},
};
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;
use url::Url;

/// Entra ID public cloud.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_REQUIRED_SCOPE: &str = "mcp:tools";
pub const DEFAULT_SCOPE_CLAIM: &str = smcp_auth::scope::DEFAULT_SCOPE_CLAIM;
pub const DEFAULT_RESOURCE_NAME: &str = "Secure MCP server";

/// Path of the authenticated capability endpoint.
pub const MCP_PATH: &str = "/mcp";
/// Path of the unauthenticated liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("external base URL is not configured")]
    MissingBaseUrl,
    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("identity authority tenant id is not configured")]
    MissingTenant,
    #[error("invalid authority host `{url}`: {reason}")]
    InvalidAuthority { url: String, reason: String },
    #[error("invalid JWKS URI `{url}`: {reason}")]
    InvalidJwksUri { url: String, reason: String },
    #[error("required scope must not be empty")]
    EmptyScope,
    #[error("scope claim name must not be empty")]
    EmptyScopeClaim,
}

/// Immutable configuration of one deployment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// External base URL without a trailing slash.
    pub base_url: String,
    /// Canonical resource identifier, `<base>/mcp`.
    pub resource: String,
    pub resource_name: String,
    /// `<base>/health`.
    pub documentation: String,
    /// Authorization server and expected `iss`.
    pub issuer: String,
    pub jwks_uri: String,
    pub audiences: Vec<String>,
    pub required_scope: String,
    pub scope_claim: String,
    pub scopes_supported: Vec<String>,
    pub cors: bool,
    pub bind: SocketAddr,
    pub key_cache: CachePolicy,
    pub validation_timeout: Duration,
}

impl ServerConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The discovery document published at the well-known path.
    pub fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata {
            resource: self.resource.clone(),
            resource_name: self.resource_name.clone(),
            authorization_servers: vec![self.issuer.clone()],
            scopes_supported: self.scopes_supported.clone(),
            resource_documentation: self.documentation.clone(),
            bearer_methods_supported: Some(vec!["header".into()]),
        }
    }

    pub fn metadata_url(&self) -> String {
        format!("{}{WELL_KNOWN_PATH}", self.base_url)
    }

    /// Challenge parameters for 401/403 responses on the capability path.
    pub fn resource_server(&self) -> ResourceServerConfig {
        ResourceServerConfig {
            resource_metadata_url: self.metadata_url(),
            default_scope: self.scopes_supported.first().cloned(),
        }
    }
}

/// Builder for [`ServerConfig`].
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    base_url: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    authority_host: Option<String>,
    jwks_uri: Option<String>,
    audiences: Vec<String>,
    required_scope: Option<String>,
    scope_claim: Option<String>,
    scopes_supported: Vec<String>,
    resource_name: Option<String>,
    cors: bool,
    bind: Option<SocketAddr>,
    key_ttl: Option<Duration>,
    min_refresh_interval: Option<Duration>,
    validation_timeout: Option<Duration>,
}

impl ConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn tenant_id(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant.into());
        self
    }

    /// Application (client) id of the protected API registration.
    pub fn client_id(mut self, client: impl Into<String>) -> Self {
        self.client_id = Some(client.into());
        self
    }

    pub fn authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = Some(host.into());
        self
    }

    pub fn jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(uri.into());
        self
    }

    /// Accept an additional `aud` value.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    pub fn required_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scope = Some(scope.into());
        self
    }

    pub fn scope_claim(mut self, claim: impl Into<String>) -> Self {
        self.scope_claim = Some(claim.into());
        self
    }

    /// Advertise a scope in the discovery document.
    pub fn scope_supported(mut self, scope: impl Into<String>) -> Self {
        self.scopes_supported.push(scope.into());
        self
    }

    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind = Some(addr);
        self
    }

    pub fn key_ttl(mut self, ttl: Duration) -> Self {
        self.key_ttl = Some(ttl);
        self
    }

    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = Some(interval);
        self
    }

    pub fn validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let base_url = self
            .base_url
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = origin_url(&base_url).map_err(|reason| ConfigError::InvalidBaseUrl {
            url: base_url.clone(),
            reason,
        })?;

        let tenant = self
            .tenant_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingTenant)?;

        let authority = self
            .authority_host
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
        let authority = http_url(&authority).map_err(|reason| ConfigError::InvalidAuthority {
            url: authority.clone(),
            reason,
        })?;

        let jwks_uri = match self.jwks_uri {
            Some(uri) => http_url(&uri)
                .map_err(|reason| ConfigError::InvalidJwksUri { url: uri, reason })?,
            None => format!("{authority}/{tenant}/discovery/v2.0/keys"),
        };

        let required_scope = self
            .required_scope
            .unwrap_or_else(|| DEFAULT_REQUIRED_SCOPE.to_string());
        if required_scope.trim().is_empty() {
            return Err(ConfigError::EmptyScope);
        }
        let scope_claim = self
            .scope_claim
            .unwrap_or_else(|| DEFAULT_SCOPE_CLAIM.to_string());
        if scope_claim.trim().is_empty() {
            return Err(ConfigError::EmptyScopeClaim);
        }

        let client_id = self
            .client_id
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let resource = format!("{base_url}{MCP_PATH}");
        let mut audiences = vec![resource.clone()];
        if let Some(client) = &client_id {
            audiences.push(format!("api://{client}"));
            audiences.push(client.clone());
        }
        for audience in self.audiences {
            if !audiences.contains(&audience) {
                audiences.push(audience);
            }
        }

        let scopes_supported = if self.scopes_supported.is_empty() {
            match &client_id {
                Some(client) => vec![format!("api://{client}/{required_scope}")],
                None => vec![required_scope.clone()],
            }
        } else {
            self.scopes_supported
        };

        let defaults = CachePolicy::default();
        let validation_timeout = self.validation_timeout.unwrap_or(defaults.fetch_timeout);

        Ok(ServerConfig {
            documentation: format!("{base_url}{HEALTH_PATH}"),
            issuer: format!("{authority}/{tenant}/v2.0"),
            resource,
            resource_name: self
                .resource_name
                .unwrap_or_else(|| DEFAULT_RESOURCE_NAME.to_string()),
            jwks_uri,
            audiences,
            required_scope,
            scope_claim,
            scopes_supported,
            cors: self.cors,
            bind: self
                .bind
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080))),
            key_cache: CachePolicy {
                ttl: self.key_ttl.unwrap_or(defaults.ttl),
                min_refresh_interval: self
                    .min_refresh_interval
                    .unwrap_or(defaults.min_refresh_interval),
                fetch_timeout: validation_timeout,
            },
            validation_timeout,
            base_url,
        })
    }
}

/// [`http_url`] without a path. Every route is served from the root, and
/// the challenge must name the same well-known URL the router serves.
fn origin_url(raw: &str) -> Result<String, String> {
    let url = http_url(raw)?;
    match Url::parse(&url).map(|u| u.path().len() > 1) {
        Ok(true) => Err("a path is not allowed; serve from the host root".into()),
        Ok(false) => Ok(url),
        Err(e) => Err(e.to_string()),
    }
}

/// Parse an absolute http(s) URL without query or fragment and return it
/// with any trailing slash removed.
fn http_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".into());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("query and fragment are not allowed".into());
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
