use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct HoneypotConfig {
    pub listen_ip: Ipv4Addr,
    pub listen_port: u16,
    pub max_body_bytes: usize,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            listen_ip: Ipv4Addr::new(192, 168, 4, 1),
            listen_port: 80,
            max_body_bytes: 4096,
            max_concurrency: 16,
            request_timeout: Duration::from_secs(30),
        }
    }
}
