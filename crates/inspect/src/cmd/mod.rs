//! Command-line interface for inspecting smcp servers.

use crate::{client::Client, error::Error};
use clap::{Parser, Subcommand};
use serde_json::json;
pub mod call;

/// Inspect a running smcp server.
#[derive(Parser, Debug)]
#[command(name = "smcp-inspect", version, about)]
pub struct App {
    /// Server base URL, e.g. `https://mcp.example.com`.
    pub target: String,

    /// Bearer token for the capability path.
    #[arg(long = "auth", value_name = "TOKEN", env = "SMCP_TOKEN")]
    pub auth: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the protected resource metadata.
    Meta,
    /// Fetch the health status line.
    Health,
    /// List tools exposed by the server.
    Tool,
    /// List prompts exposed by the server.
    Prompt,
    /// List resources exposed by the server.
    Resource,
    /// Call a tool with arguments.
    Call {
        /// Name of the tool to call.
        name: String,

        /// Tool arguments as key=value pairs (e.g. min=1 max=10).
        /// Values are parsed as JSON; plain strings are treated as JSON strings.
        #[arg(value_name = "KEY=VALUE")]
        args: Vec<String>,
    },
}

impl App {
    /// Parse CLI arguments and execute the corresponding command.
    pub async fn run() -> Result<(), Error> {
        App::parse().execute().await
    }

    pub async fn execute(self) -> Result<(), Error> {
        let client = Client::new(&self.target, self.auth)?;
        let output = match self.command {
            Command::Meta => client.metadata().await?,
            Command::Health => {
                println!("{}", client.health().await?);
                return Ok(());
            }
            Command::Tool => client.request("tools/list", json!({})).await?,
            Command::Prompt => client.request("prompts/list", json!({})).await?,
            Command::Resource => client.request("resources/list", json!({})).await?,
            Command::Call { name, args } => call::call(&client, name, &args).await?,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
