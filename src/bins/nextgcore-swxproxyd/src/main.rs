//! NextGCore SWx Proxy
//!
//! Serves non-3GPP subscriber authentication for an AAA front end by
//! proxying onto the SWx interface of one or more HSSs.

use anyhow::{Context, Result};
use clap::Parser;
use nextgcore_swxproxyd::{Config, RpcServer, SwxProxyContext};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// NextGCore SWx Proxy - SWx authentication proxy
#[derive(Parser, Debug)]
#[command(name = "nextgcore-swxproxyd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SWx authentication proxy towards the HSS", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "/etc/nextgcore/swx_proxy.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,

    /// RPC listen address (overrides rpc.addr)
    #[arg(long)]
    rpc_addr: Option<SocketAddr>,

    /// Disable authentication vector caching
    #[arg(long)]
    no_cache: bool,
}

/// Global shutdown flag
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    log::info!("NextGCore SWx Proxy v{} starting...", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let config = if std::path::Path::new(&args.config).exists() {
        log::info!("Loading configuration from {}", args.config);
        Config::load(&args.config).with_context(|| format!("Failed to load {}", args.config))?
    } else {
        log::warn!("Configuration file not found: {}, using defaults", args.config);
        Config::default()
    };

    let rpc_addr = match args.rpc_addr {
        Some(addr) => addr,
        None => config.rpc.socket_addr()?,
    };

    let context = SwxProxyContext::new(&config.swx_proxy, !args.no_cache, None)
        .context("Failed to build SWx proxy")?;
    log::info!(
        "SWx proxy initialized ({} backend(s), cache {})",
        config.swx_proxy.servers.len(),
        if context.cache().is_some() { "enabled" } else { "disabled" }
    );

    let server = RpcServer::new(rpc_addr);
    server
        .start(context.service())
        .await
        .context("Failed to start RPC server")?;

    log::info!("NextGCore SWx Proxy ready");

    run_event_loop(shutdown).await;

    log::info!("Shutting down...");
    server.stop().await;
    context.shutdown();

    log::info!("NextGCore SWx Proxy stopped");
    Ok(())
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    builder.filter_level(level);

    builder.format_timestamp_millis();

    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.init();

    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown_clone.store(true, Ordering::SeqCst);
        SHUTDOWN.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    Ok(())
}

/// Wait until a shutdown signal arrives
async fn run_event_loop(shutdown: Arc<AtomicBool>) {
    log::debug!("Entering main event loop");

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    while !shutdown.load(Ordering::SeqCst) && !SHUTDOWN.load(Ordering::SeqCst) {
        interval.tick().await;
    }

    log::debug!("Exiting main event loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::parse_from(["nextgcore-swxproxyd"]);
        assert_eq!(args.config, "/etc/nextgcore/swx_proxy.yaml");
        assert_eq!(args.log_level, "info");
        assert_eq!(args.rpc_addr, None);
        assert!(!args.no_color);
        assert!(!args.no_cache);
    }

    #[test]
    fn test_args_custom() {
        let args = Args::parse_from([
            "nextgcore-swxproxyd",
            "-c", "/custom/swx_proxy.yaml",
            "-e", "debug",
            "-m",
            "--rpc-addr", "127.0.0.1:9999",
            "--no-cache",
        ]);
        assert_eq!(args.config, "/custom/swx_proxy.yaml");
        assert_eq!(args.log_level, "debug");
        assert!(args.no_color);
        assert_eq!(args.rpc_addr, Some("127.0.0.1:9999".parse().unwrap()));
        assert!(args.no_cache);
    }

    #[test]
    fn test_args_bad_rpc_addr() {
        assert!(Args::try_parse_from(["nextgcore-swxproxyd", "--rpc-addr", "nowhere"]).is_err());
    }
}
