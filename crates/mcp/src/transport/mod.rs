//! Network bindings for the dispatcher.

mod cors;
mod endpoint;

pub use cors::{CorsLayer, CorsService};
pub use endpoint::{ctrl_c, router, serve};
