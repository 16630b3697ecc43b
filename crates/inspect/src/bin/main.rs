//! Binary entry point for the smcp-inspect CLI.

use smcp_inspect::cmd::App;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    if let Err(e) = App::run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
