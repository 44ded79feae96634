//! Responder lifecycle
//!
//! The responder owns a listener thread with a dedicated single-worker
//! runtime. Start binds the listener synchronously so address errors
//! surface to the caller; stop signals graceful shutdown and joins the
//! thread.

use std::net::{IpAddr, SocketAddr, TcpListener};
use std::thread::JoinHandle;

use anyhow::{Context, Result};

use crate::config::HoneypotConfig;
use crate::log::ConnectionLog;
use crate::server::{build_router, run_server, HoneypotState};

/// Handle to a running deceptive responder.
pub struct Responder {
    local_addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Responder {
    /// Bind and start serving. The connection log is shared with the
    /// caller; records appear in it as requests arrive.
    pub fn start(cfg: &HoneypotConfig, log: ConnectionLog) -> Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(cfg.listen_ip), cfg.listen_port);
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("binding honeypot responder to {addr}"))?;
        listener
            .set_nonblocking(true)
            .context("setting honeypot listener nonblocking")?;
        let local_addr = listener
            .local_addr()
            .context("reading honeypot listener address")?;

        let app = build_router(cfg, HoneypotState::new(log));
        let (shutdown, shutdown_rx) = tokio::sync::oneshot::channel();

        tracing::info!("Starting honeypot responder on {local_addr}");

        let thread = std::thread::Builder::new()
            .name("wavetap-honeypot".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        tracing::error!("failed to build honeypot runtime: {err}");
                        return;
                    }
                };

                if let Err(err) = runtime.block_on(run_server(listener, app, shutdown_rx)) {
                    tracing::error!("honeypot responder exited with error: {err:#}");
                }
            })
            .context("spawning honeypot responder thread")?;

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Address the responder is actually bound to (port 0 resolves here).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal shutdown and wait for the serving thread to finish.
    pub fn stop(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        tracing::info!("Honeypot responder stopped");
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::Ipv4Addr;

    fn loopback_config() -> HoneypotConfig {
        HoneypotConfig {
            listen_ip: Ipv4Addr::LOCALHOST,
            listen_port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn responder_serves_and_logs_over_a_real_socket() {
        let log = ConnectionLog::new();
        let responder = Responder::start(&loopback_config(), log.clone()).unwrap();
        let addr = responder.local_addr();

        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        write!(stream, "GET / HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("/dashboard"));
        assert_eq!(log.len(), 1);

        responder.stop();
    }

    #[test]
    fn stop_is_clean_without_traffic() {
        let responder = Responder::start(&loopback_config(), ConnectionLog::new()).unwrap();
        responder.stop();
    }
}
