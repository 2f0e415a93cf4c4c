//! storefront-client command line.
//!
//! Sends one request through the full client stack (auth, breaker, retries,
//! normalization) and prints the JSON result. Useful for checking a config
//! file against a running backend.

use clap::{Parser, Subcommand};
use reqwest::Method;
use std::path::PathBuf;
use std::process::ExitCode;

use storefront_client::config::{load_config, ClientConfig};
use storefront_client::observability::{logging, metrics};
use storefront_client::{ApiClient, RequestContext};

#[derive(Parser)]
#[command(name = "storefront-client")]
#[command(about = "Resilient client for the storefront API", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Access token to send with non-public requests
    #[arg(short, long)]
    token: Option<String>,

    /// Print the client metrics to stderr when done
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request and print the decoded payload
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Path relative to the configured base URL
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ClientConfig::default(),
    };

    if let Err(e) = logging::init(&config.observability.log_level) {
        eprintln!("Warning: logging already initialized: {e}");
    }

    let recorder = if cli.metrics {
        match metrics::install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("Warning: metrics unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    let result = run(cli.command, cli.token, config).await;

    if let Some(handle) = recorder {
        eprintln!("{}", handle.render());
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, token: Option<String>, config: ClientConfig) -> Result<(), String> {
    match command {
        Commands::CheckConfig => {
            let rendered = toml::to_string_pretty(&config).map_err(|e| e.to_string())?;
            println!("{rendered}");
            println!("Configuration OK");
            Ok(())
        }
        Commands::Request { method, path, data } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| format!("invalid method '{method}'"))?;

            let client = ApiClient::new(config).map_err(|e| e.to_string())?;
            if let Some(token) = token {
                client.tokens().set_tokens(token, "");
            }

            let mut ctx = RequestContext::new(method, path);
            if let Some(data) = data {
                let body: serde_json::Value =
                    serde_json::from_str(&data).map_err(|e| format!("--data is not valid JSON: {e}"))?;
                ctx = ctx.with_json(&body).map_err(|e| e.to_string())?;
            }

            match client.send::<serde_json::Value>(ctx).await {
                Ok(payload) => {
                    let pretty = serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())?;
                    println!("{pretty}");
                    Ok(())
                }
                Err(err) => {
                    let mut report = serde_json::json!({
                        "message": err.message,
                        "status": err.status,
                        "code": err.code,
                    });
                    if let Some(details) = &err.details {
                        report["details"] = serde_json::json!(details);
                    }
                    let pretty = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
                    println!("{pretty}");
                    Err(err.to_string())
                }
            }
        }
    }
}
