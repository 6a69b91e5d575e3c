//! # Pincast Node Entry Point
//!
//! Bootstraps the worker: logging, environment configuration, clients,
//! and the polling loop with Ctrl-C shutdown.
//!
//! ## Required Environment
//! - `PINCAST_EMAIL`: identity reported to the dispatcher
//!
//! See `pincast_common::config` for the optional variables.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info, Level};

use pincast_common::Config;
use pincast_node::{HttpDispatcher, IpfsApi, Scheduler};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("═══════════════════════════════════════════════════");
    info!("  pincast node {}", pincast_node::USER_AGENT);
    info!("═══════════════════════════════════════════════════");
    info!("Identity:    {}", config.email);
    info!("Dispatcher:  {}", config.dispatcher_url);
    info!("Daemon API:  {}", config.ipfs_api_url);
    info!("Mirrors:     {} | {}", config.mirror_a, config.mirror_b);
    if let Some(dir) = &config.debug_dump_dir {
        info!("Debug dumps: {}", dir.display());
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!("Cannot create debug dump directory: {}", e);
            std::process::exit(1);
        }
    }
    info!("═══════════════════════════════════════════════════");

    let gateway = IpfsApi::new(&config);
    let dispatcher = HttpDispatcher::new(&config);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config);

    let shutdown = Arc::new(Notify::new());
    let signal_target = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, finishing current iteration");
            signal_target.notify_one();
        }
    });

    scheduler.run(shutdown).await;
    info!("pincast node stopped");
}
