//! Resilience control plane daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   plane.toml ──▶ config ──▶ ControlPlane ──┬──▶ BreakerRegistry
//!                                            ├──▶ RateLimiter
//!                                            └──▶ FailoverManager ◀── HealthMonitor (interval)
//!                                                       │
//!                                                       ▼
//!                                               deployments.json
//!
//!   operator ── planectl ── HTTP ──▶ admin router ──▶ ControlPlane
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use resilience_plane::admin::setup_admin_router;
use resilience_plane::config::load_config;
use resilience_plane::observability::{logging, metrics};
use resilience_plane::region::HealthMonitor;
use resilience_plane::{ControlPlane, Shutdown};

#[derive(Parser)]
#[command(name = "resilience-plane")]
#[command(about = "Circuit breaking, rate limiting and multi-region failover", long_about = None)]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "plane.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "resilience-plane starting"
    );

    if config.observability.metrics_enabled {
        // Validated at load time.
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let plane = Arc::new(ControlPlane::from_config(&config)?);
    let shutdown = Shutdown::new();

    let monitor = if config.regions.monitor_enabled {
        let monitor = HealthMonitor::new(
            plane.regions.clone(),
            Duration::from_secs(config.regions.monitor_interval_secs),
        );
        Some(tokio::spawn(monitor.run(shutdown.subscribe())))
    } else {
        tracing::info!("Region health monitor disabled");
        None
    };

    if config.admin.enabled {
        let router = setup_admin_router(plane.clone(), &config.admin)?;
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let signal = shutdown.clone();
        tokio::spawn(async move { signal.trigger_on_ctrl_c().await });

        let mut drain = shutdown.subscribe();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = drain.recv().await;
        })
        .await?;
        tracing::info!("Admin API stopped");
    } else {
        tracing::info!("Admin API disabled");
        shutdown.trigger_on_ctrl_c().await;
    }

    if let Some(handle) = monitor {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
