//! rt5-server: runs the protocol engine and world loop.

use clap::Parser;
use rt5_protocol::config::ServerSettings;
use rt5_protocol::context::ServerContext;
use rt5_protocol::engine::{BootstrapHooks, TickScheduler};
use rt5_protocol::error::Result;
use rt5_protocol::store::{FileAssetStore, JsonMapKeys, MapKeyStore};
use rt5_protocol::transport::Server;
use rt5_protocol::utils::logging::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used if it does not exist
    #[arg(short, long, default_value = "rt5.toml")]
    config: PathBuf,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    example_config: bool,
}

fn load_settings(args: &Args) -> Result<ServerSettings> {
    let mut settings = if args.config.exists() {
        ServerSettings::from_file(&args.config)?
    } else {
        ServerSettings::default()
    };
    settings.apply_env(|key| std::env::var(key).ok());

    if let Some(listen) = &args.listen {
        settings.server.address = listen.clone();
    }
    if args.debug {
        settings.logging.log_level = Level::DEBUG;
    }
    Ok(settings)
}

fn load_map_keys(settings: &ServerSettings) -> Arc<dyn MapKeyStore> {
    let path = &settings.protocol.map_keys_path;
    match JsonMapKeys::from_file(path) {
        Ok(keys) => {
            info!(path = %path.display(), squares = keys.len(), "Loaded map keys");
            Arc::new(keys)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "No map keys loaded, regions will use zero keys");
            Arc::new(JsonMapKeys::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.example_config {
        println!("{}", ServerSettings::example_config());
        return Ok(());
    }

    let settings = load_settings(&args)?;
    init_logging(&settings.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), config = %args.config.display(), "Starting");

    let assets = Arc::new(FileAssetStore::new(&settings.protocol.asset_root));
    let map_keys = load_map_keys(&settings);
    let hooks = Arc::new(BootstrapHooks::new(Arc::clone(&map_keys)));
    let shutdown_timeout = settings.server.shutdown_timeout;

    let ctx = Arc::new(ServerContext::new(settings, assets, map_keys, hooks)?);
    let server = Arc::new(Server::bind(Arc::clone(&ctx)).await?);

    let stop_ticks = CancellationToken::new();
    let scheduler = TickScheduler::new(Arc::clone(&ctx));
    let ticks = tokio::spawn({
        let stop = stop_ticks.clone();
        async move { scheduler.run(stop).await }
    });

    let accept = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve().await }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
    }
    info!("Shutdown signal received");

    if let Err(e) = server.shutdown(shutdown_timeout).await {
        warn!(error = %e, "Connections did not drain cleanly");
    }
    stop_ticks.cancel();

    match accept.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Accept loop failed"),
        Err(e) => error!(error = %e, "Accept task panicked"),
    }
    if let Err(e) = ticks.await {
        error!(error = %e, "Tick task panicked");
    }

    ctx.metrics.log_metrics();
    info!("Stopped");
    Ok(())
}
