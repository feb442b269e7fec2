//! CBUS gateway: entry point.
//!
//! Opens one connection to a CAN interface (USB serial or TCP) and shares it
//! with any number of TCP clients.  Every frame read from the bus is copied
//! to every client; every frame a client sends is decoded and queued for the
//! bus.
//!
//! # Usage
//!
//! ```text
//! cbus-gateway [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>        TOML configuration file [default: cbusio.toml]
//!       --driver <KIND>        serial | tcp
//!       --port <NAME>          Port to connect to at start-up
//!       --listen-port <PORT>   Gateway listener port
//!       --bind <IP>            Gateway bind address
//!       --no-gateway           Connect to the bus without serving clients
//!       --list-ports           Print the ports the driver offers and exit
//!       --save-config          Write the merged configuration back to --config
//!       --no-feedback / --no-sync / --no-detectors / --no-reconnect
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Overrides        |
//! |-----------------------|------------------|
//! | `CBUSIO_CONFIG`       | `--config`       |
//! | `CBUSIO_DRIVER`       | `--driver`       |
//! | `CBUSIO_PORT`         | `--port`         |
//! | `CBUSIO_LISTEN_PORT`  | `--listen-port`  |
//! | `CBUSIO_BIND`         | `--bind`         |
//!
//! Command-line values win over the environment, which wins over the file.
//! `RUST_LOG` wins over `driver.log_level`.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cbus_driver::infrastructure::transport::transport_for;
use cbus_driver::{BusDriver, CommsState, Driver, DriverKind};
use cbus_gateway::application::keep_connected;
use cbus_gateway::infrastructure::storage::{load_config, save_config, AppConfig, DEFAULT_CONFIG_FILE};
use cbus_gateway::Gateway;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Shares one CBUS connection among many TCP clients.
#[derive(Debug, Parser)]
#[command(
    name = "cbus-gateway",
    about = "Share one CBUS interface with many TCP clients",
    version
)]
struct Cli {
    /// TOML configuration file.  Missing files fall back to defaults.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "CBUSIO_CONFIG")]
    config: PathBuf,

    /// Transport used to reach the bus: `serial` or `tcp`.
    #[arg(long, env = "CBUSIO_DRIVER")]
    driver: Option<DriverKind>,

    /// Port to connect to at start-up (`/dev/ttyACM0`, `COM3`, `host:port`).
    #[arg(long, env = "CBUSIO_PORT")]
    port: Option<String>,

    /// TCP port the gateway listens on.
    #[arg(long, env = "CBUSIO_LISTEN_PORT")]
    listen_port: Option<u16>,

    /// IP address the gateway binds.
    #[arg(long, env = "CBUSIO_BIND")]
    bind: Option<String>,

    /// Connect to the bus but do not start the TCP listener.
    #[arg(long)]
    no_gateway: bool,

    /// Print the ports the selected driver offers and exit.
    #[arg(long)]
    list_ports: bool,

    /// Write the merged configuration back to `--config`.
    #[arg(long)]
    save_config: bool,

    #[arg(long)]
    no_feedback: bool,

    #[arg(long)]
    no_sync: bool,

    #[arg(long)]
    no_detectors: bool,

    /// Do not reopen the bus connection after it drops.
    #[arg(long)]
    no_reconnect: bool,
}

impl Cli {
    /// Overlays command-line values onto the file configuration.
    ///
    /// Flags only ever switch features off; an absent flag leaves the file
    /// value in place.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(kind) = self.driver {
            config.driver.kind = kind;
        }
        if let Some(port) = &self.port {
            config.driver.autoconnect = Some(port.clone());
        }
        if let Some(listen_port) = self.listen_port {
            config.gateway.listen_port = listen_port;
        }
        if let Some(bind) = &self.bind {
            config.gateway.bind_address = bind.clone();
        }
        if self.no_gateway {
            config.gateway.enabled = false;
        }
        config.flags.no_feedback |= self.no_feedback;
        config.flags.no_sync |= self.no_sync;
        config.flags.no_detectors |= self.no_detectors;
        config.flags.no_reconnect |= self.no_reconnect;
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    cli.apply_to(&mut config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.driver.log_level)),
        )
        .init();

    if cli.save_config {
        save_config(&cli.config, &config)
            .with_context(|| format!("failed to save {}", cli.config.display()))?;
        info!("configuration written to {}", cli.config.display());
    }

    let options = config.driver_options();
    let transport = transport_for(&options);

    if cli.list_ports {
        for port in transport.available_ports() {
            println!("{port}");
        }
        return Ok(());
    }

    info!(
        "CBUS gateway starting: driver={}, autoconnect={}",
        options.kind,
        options.autoconnect.as_deref().unwrap_or("none")
    );

    let driver: Arc<dyn BusDriver> = Arc::new(Driver::new(transport, options.clone()));
    driver.subscribe_comms_state(Arc::new(|state: CommsState| {
        info!("bus connection is now {state}");
    }));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Bus connection ────────────────────────────────────────────────────────
    let supervisor = match &options.autoconnect {
        Some(port) => {
            if let Err(e) = driver.connect(port).await {
                warn!("initial connection failed: {e}");
            }
            if options.flags.no_reconnect {
                None
            } else {
                Some(tokio::spawn(keep_connected(
                    Arc::clone(&driver),
                    port.clone(),
                    config.reconnect_interval(),
                    Arc::clone(&running),
                )))
            }
        }
        None => {
            warn!("no autoconnect port configured; the bus stays disconnected");
            None
        }
    };

    // ── Gateway ───────────────────────────────────────────────────────────────
    let gateway = if config.gateway.enabled {
        let gateway_config = config.gateway_config()?;
        Some(
            Gateway::start(Arc::clone(&driver), gateway_config)
                .await
                .context("failed to start gateway")?,
        )
    } else {
        info!("gateway disabled");
        None
    };

    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    if let Some(gateway) = gateway {
        gateway.shutdown().await;
    }
    if let Some(supervisor) = supervisor {
        let attempts = supervisor.await.unwrap_or_default();
        info!("reconnect supervisor stopped after {attempts} attempt(s)");
    }
    driver.close().await;

    info!("CBUS gateway stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
