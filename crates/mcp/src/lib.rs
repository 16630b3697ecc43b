//! # smcp
//!
//! An MCP server whose capability path is guarded by bearer-token
//! validation and a delegated-scope check.
//!
//! Capabilities are registered once into a [`Registry`], which is then
//! frozen behind an `Arc` and handed to the [`Dispatcher`]. The
//! [`transport::router`] binds the dispatcher to `POST /mcp` behind the
//! `smcp-auth` gate, next to the unauthenticated health and discovery
//! endpoints.
//!
//! ```rust,ignore
//! let config = ServerConfig::builder()
//!     .base_url("https://mcp.example.com")
//!     .tenant_id(tenant)
//!     .build()?;
//!
//! let mut registry = Registry::new();
//! registry.register(Capability::tool("echo", "Echo input", echo))?;
//!
//! let app = transport::router(&config, gate, Dispatcher::new(Arc::new(registry)));
//! ```

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use capability::{Capability, CapabilityError, CapabilityKind, Descriptor};
pub use config::{ConfigBuilder, ConfigError, ServerConfig};
pub use dispatch::{DispatchError, Dispatcher, Outcome};
pub use registry::{Registry, RegistryError};
