//! Inspect a running smcp server over HTTP.

pub mod client;
pub mod cmd;
pub mod error;
