mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use runtime::{ConnectionManager, Dispatcher, InvocationRequest, InvocationResult, ToolRegistry};
use server::AppState;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "capstan")]
#[command(about = "A tool registry and dispatch server", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: capstan.toml in the working directory, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve {
        /// Address to bind, overriding the config file
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// List the built-in tools
    Tools,
    /// Invoke a tool once and print the outcome
    Call {
        /// Tool name
        tool: String,
        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
        /// Run the call on a running server over WebSocket instead of in-process
        /// (bare `--url` means the local default endpoint)
        #[arg(short, long, num_args = 0..=1, default_missing_value = client::DEFAULT_URL)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::discover(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
        Some(Commands::Tools) => cmd_tools(&config).await,
        Some(Commands::Call { tool, params, url }) => match url {
            Some(url) => cmd_call_remote(&url, &tool, &params).await,
            None => cmd_call(&config, tool, &params).await,
        },
    }
}

/// Registry with every built-in tool, behind a dispatcher and connection
/// manager configured from `config`.
async fn build_manager(config: &Config) -> Result<Arc<ConnectionManager>> {
    let registry = Arc::new(ToolRegistry::new());
    tools::register_builtin(&registry, &config.tools_config()).await?;
    let dispatcher = Arc::new(Dispatcher::new(registry, config.dispatch_config()));
    Ok(Arc::new(ConnectionManager::new(
        dispatcher,
        config.connection_config(),
    )))
}

async fn cmd_serve(config: Config, bind: Option<String>) -> Result<()> {
    let manager = build_manager(&config).await?;
    let bind = bind.unwrap_or(config.server.bind);
    let listener = TcpListener::bind(&bind).await?;

    println!("capstan v{}", env!("CARGO_PKG_VERSION"));
    println!("HTTP:      http://{}", listener.local_addr()?);
    println!("WebSocket: ws://{}/ws", listener.local_addr()?);
    println!("Press Ctrl+C to stop.\n");

    server::serve(listener, AppState::new(manager), shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!("cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let manager = build_manager(config).await?;
    let listings = manager.registry().listings().await;

    println!("{:<20}  {:<40}  PARAMETERS", "NAME", "DESCRIPTION");
    println!("{}", "-".repeat(90));
    for listing in listings {
        let params: Vec<String> = listing
            .parameter_schema
            .iter()
            .map(|(name, spec)| {
                let marker = if spec.required { "*" } else { "" };
                format!("{name}{marker}: {}", spec.kind)
            })
            .collect();
        println!(
            "{:<20}  {:<40}  {}",
            listing.name,
            listing.description,
            params.join(", ")
        );
    }
    Ok(())
}

async fn cmd_call(config: &Config, tool: String, params: &str) -> Result<()> {
    let raw = serde_json::from_str(params).map_err(Error::InvalidParams)?;
    let manager = build_manager(config).await?;

    let result = manager
        .dispatcher()
        .invoke(InvocationRequest::new(tool, raw))
        .await;

    match result {
        InvocationResult::Success { payload } => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        InvocationResult::Failure(error) => Err(Error::Invocation(error)),
    }
}

async fn cmd_call_remote(url: &str, tool: &str, params: &str) -> Result<()> {
    let raw = serde_json::from_str(params).map_err(Error::InvalidParams)?;
    let payload = client::execute(url, tool, raw).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
