//! Standalone honeypot responder
//!
//! Runs the deceptive responder outside the handheld, for bench testing
//! the decoy flow against real clients. Configuration comes from the
//! environment; the connection log is dumped on shutdown.

use std::env;
use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use wavetap_honeypot::{ConnectionLog, HoneypotConfig, Responder};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    tracing::info!("Wavetap honeypot responder starting");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    tracing::info!("  Bind: {}:{}", config.listen_ip, config.listen_port);
    tracing::info!(
        "  Suggested SSID for the open AP: {}",
        wavetap_honeypot::random_decoy_ssid()
    );

    let log = ConnectionLog::new();
    let responder = Responder::start(&config, log.clone())?;
    tracing::info!("Responder listening on {}", responder.local_addr());

    wait_for_signal()?;
    tracing::info!("Shutting down...");
    responder.stop();

    for record in log.snapshot() {
        tracing::info!(
            "captured {}:{} at {}ms\n{}",
            record.client_ip,
            record.client_port,
            record.timestamp_ms,
            record.request_summary
        );
    }

    Ok(())
}

fn load_config() -> Result<HoneypotConfig> {
    let listen_ip: Ipv4Addr = env::var("WAVETAP_HONEYPOT_BIND")
        .unwrap_or_else(|_| "0.0.0.0".to_string())
        .parse()
        .context("invalid WAVETAP_HONEYPOT_BIND")?;
    let listen_port: u16 = env::var("WAVETAP_HONEYPOT_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .context("invalid WAVETAP_HONEYPOT_PORT")?;

    Ok(HoneypotConfig {
        listen_ip,
        listen_port,
        ..Default::default()
    })
}

fn wait_for_signal() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime.block_on(async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = async {
                #[cfg(unix)]
                {
                    use tokio::signal::unix::{signal, SignalKind};
                    match signal(SignalKind::terminate()) {
                        Ok(mut term) => { term.recv().await; }
                        Err(_) => std::future::pending::<()>().await,
                    }
                }
                #[cfg(not(unix))]
                std::future::pending::<()>().await
            } => {}
        }
    });
    Ok(())
}
