//! Capabilities served by smcp.
//!
//! - `random-number`: a random integer in an inclusive range
//! - `current-date`: today's date and time, optionally in an IANA timezone
//! - `summarize`: prompt template asking the model to summarize text
//! - `docs://server`: Markdown documentation of this server

use smcp::{Registry, RegistryError};

pub mod date;
pub mod docs;
pub mod prompts;
pub mod random;

/// Instructions returned from `initialize`.
pub const INSTRUCTIONS: &str = "Secure MCP server providing random-number and current-date tools, \
     a summarize prompt and the docs://server documentation resource.";

/// Register every capability in this crate.
pub fn register_all(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(random::random_number())?;
    registry.register(date::current_date())?;
    registry.register(prompts::summarize())?;
    registry.register(docs::documentation())?;
    Ok(())
}
