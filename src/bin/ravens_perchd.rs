//! ravens-perchd: the long-running reconciliation daemon. Wires real event
//! ingress and HTTP clients to the [`Reconciler`] and drives it until
//! terminated.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ravens_perch::config::SystemConfig;
use ravens_perch::ingress;
use ravens_perch::reconciler::Reconciler;
use ravens_perch::store::Store;
use ravens_perch::supervisor::registration::ReqwestOrchestrationClient;
use ravens_perch::supervisor::stream::ReqwestMediaServerClient;

#[derive(Parser, Debug)]
#[command(name = "ravens-perchd", about = "UVC camera reconciliation daemon")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used for anything
    /// the file omits, and the whole file is optional.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => SystemConfig::load_from_file(&path).context("loading configuration file")?,
        None => SystemConfig::load_or_default(),
    };
    config.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    ravens_perch::init_logging();
    log::info!("ravens-perchd starting, data_dir={:?}", config.data_dir);

    let store = Store::open(&config.store_path()).context("opening settings store")?;

    let call_timeout = Duration::from_secs(config.call_timeout_secs);
    let stream_client = ReqwestMediaServerClient::new(config.mediamtx.control_base_url.clone(), call_timeout)
        .context("building MediaMTX client")?;
    let orchestration_client = ReqwestOrchestrationClient::new(config.moonraker.base_url.clone(), call_timeout)
        .context("building Moonraker client")?;

    let reconciler = Reconciler::new(store, stream_client, orchestration_client, config.clone())
        .await
        .context("bootstrapping reconciler settings")?;

    let token = CancellationToken::new();
    let (ingress_tx, ingress_rx) = mpsc::channel(64);
    let (admin_tx, admin_rx) = mpsc::channel(16);

    let _ingress_handle = ingress::spawn(ingress_tx, token.clone(), Duration::from_secs(config.poll_interval_secs));

    // External admin surfaces (HTTP, CLI) are out of this binary's scope;
    // holding the handle keeps the channel open for future wiring.
    let _admin_handle = ravens_perch::AdminHandle::new(admin_tx);

    let shutdown_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("received shutdown signal");
            shutdown_token.cancel();
        }
    });

    match reconciler.run(ingress_rx, admin_rx, token).await {
        Ok(()) => {
            log::info!("ravens-perchd shut down cleanly");
            Ok(())
        }
        Err(e) => {
            log::error!("ravens-perchd exiting on fatal error: {e}");
            Err(e).context("reconciler loop exited")
        }
    }
}
