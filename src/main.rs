//! Zentinel SOAP cache key tool.
//!
//! Run with: `zentinel-soap-cache-key --config config.yaml check getAccount`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::{HeaderMap, HeaderValue, Method};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_cache_key::parser::parse_soap_action;
use zentinel_soap_cache_key::{CacheKeyConfig, CacheKeyGenerator, RuleStore, SoapRequest};

/// Inspect SOAP cache eligibility rules and derive cache keys.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Rules file, overriding the configured path
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether an operation is eligible for caching, and why
    Check {
        /// Operation identifier (quotes are ignored)
        action: String,
    },

    /// Derive the cache key for a request body
    Key {
        /// SOAPAction header value
        #[arg(short, long)]
        action: Option<String>,

        /// Content-Type header value
        #[arg(long, default_value = "text/xml; charset=utf-8")]
        content_type: String,

        /// HTTP method
        #[arg(short, long, default_value = "POST")]
        method: String,

        /// Treat the body as having no declared length
        #[arg(long)]
        chunked: bool,

        /// Body file, or `-` for stdin
        body: PathBuf,
    },

    /// Keep the rules loaded and reloading until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let mut config = CacheKeyConfig::load(&args.config).context("Failed to load config file")?;
    config.apply_env();
    if let Some(rules) = args.rules {
        config.rules.path = rules;
    }
    info!(
        rules = %config.rules.path.display(),
        pattern_syntax = ?config.rules.pattern_syntax,
        "Configuration loaded"
    );

    let store = Arc::new(RuleStore::new(config.rules.clone()));

    match args.command {
        Command::Check { action } => {
            let decision = store.decide(&parse_soap_action(&action));
            println!(
                "{}: {} ({:?})",
                action,
                if decision.eligible { "eligible" } else { "not eligible" },
                decision.reason
            );
        }
        Command::Key {
            action,
            content_type,
            method,
            chunked,
            body,
        } => {
            let method = Method::from_bytes(method.as_bytes()).context("Invalid HTTP method")?;
            let mut headers = HeaderMap::new();
            headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_str(&content_type).context("Invalid Content-Type")?,
            );
            let generator = CacheKeyGenerator::from_settings(store.clone(), &config.settings)?;
            if let Some(action) = action {
                headers.insert(
                    generator.action_header().clone(),
                    HeaderValue::from_str(&action).context("Invalid action value")?,
                );
            }

            let mut request = if body.as_os_str() == "-" {
                SoapRequest::new(method, headers, None, tokio::io::stdin())
            } else {
                let file = tokio::fs::File::open(&body)
                    .await
                    .with_context(|| format!("Failed to open {}", body.display()))?;
                let length = if chunked {
                    None
                } else {
                    Some(file.metadata().await?.len())
                };
                SoapRequest::new(method, headers, length, file)
            };

            match generator.derive_key(&mut request).await? {
                Some(key) => println!("{}", key),
                None => println!("no key"),
            }
        }
        Command::Watch => {
            store.start();
            info!(
                rules = %store.config().path.display(),
                reload_interval_ms = store.config().effective_reload_interval().as_millis() as u64,
                "Watching rules, press Ctrl+C to stop"
            );
            shutdown_signal().await;
            info!("Shutdown signal received");
        }
    }

    store.stop();
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
