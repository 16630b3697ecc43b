//! OAuth 2.1 resource server support for MCP servers.
//!
//! Implements the server-side (resource server) requirements of the
//! [MCP Authorization specification](https://modelcontextprotocol.io/specification/draft/basic/authorization):
//!
//! - **Protected Resource Metadata** ([RFC 9728](https://datatracker.ietf.org/doc/html/rfc9728)):
//!   Serve `/.well-known/oauth-protected-resource` so MCP clients can discover
//!   authorization servers.
//!
//! - **Error responses**: 401 and 403 responses with proper
//!   `WWW-Authenticate` headers per [RFC 6750](https://datatracker.ietf.org/doc/html/rfc6750).

mod error;
mod metadata;

pub use error::{
    ResourceServerConfig, auth_error_response, challenge, www_authenticate_401,
    www_authenticate_403, www_authenticate_invalid,
};
pub use metadata::{ResourceMetadata, WELL_KNOWN_PATH, metadata_router};
