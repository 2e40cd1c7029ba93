mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stockpile::config::StockpileConfig;

#[derive(Parser)]
#[command(name = "stockpile", version, about = "Storage index and item-fetching agent for a world full of chests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (MCP over stdio, or the HTTP dashboard)
    Serve {
        /// Override `server.transport`: "stdio" or "http"
        #[arg(long)]
        transport: Option<String>,
    },
    /// Read storage commands from the terminal
    Console,
    /// Index the storage area and search it
    Search {
        /// Case-insensitive item name substring
        query: String,
    },
    /// Index the storage area and list everything in it
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = StockpileConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "stdio" => server::serve_stdio(config).await?,
                "http" => server::serve_http(config).await?,
                other => anyhow::bail!("unknown transport: {other} (expected stdio or http)"),
            }
        }
        Command::Console => {
            let warehouse = server::open_warehouse(config).await?;
            cli::console::run(warehouse).await?;
        }
        Command::Search { query } => {
            cli::search::search(config, &query).await?;
        }
        Command::List => {
            cli::list::list(config).await?;
        }
    }

    Ok(())
}
