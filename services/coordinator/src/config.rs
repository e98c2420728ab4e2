use std::net::{IpAddr, SocketAddr};

pub const DEFAULT_REQUEST_PORT: u16 = 4242;
pub const DEFAULT_SNAPSHOT_PORT: u16 = 4243;

/// Coordinator settings.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Where viewers send operations.
    pub bind_addr: String,
    /// Port viewers listen on for snapshots, used when a `connect` address
    /// carries no port of its own.
    pub snapshot_port: u16,
    /// Status HTTP API; disabled when unset.
    pub status_addr: Option<String>,
    /// Snapshots queued per viewer before it counts as hung.
    pub viewer_queue: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_REQUEST_PORT),
            snapshot_port: DEFAULT_SNAPSHOT_PORT,
            status_addr: None,
            viewer_queue: 64,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            snapshot_port: std::env::var("SNAPSHOT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.snapshot_port),
            status_addr: std::env::var("STATUS_ADDR")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            viewer_queue: std::env::var("VIEWER_QUEUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.viewer_queue),
        }
    }

    /// Loopback on an ephemeral port.
    pub fn local() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            ..Self::default()
        }
    }

    /// Where to dial a viewer's snapshot listener. Addresses that already
    /// name a port are used as given.
    pub fn snapshot_target(&self, ip_addr: &str) -> String {
        let ip_addr = ip_addr.trim();
        if ip_addr.parse::<SocketAddr>().is_ok() {
            return ip_addr.to_string();
        }
        if let Ok(ip) = ip_addr.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.snapshot_port).to_string();
        }
        if ip_addr.contains(':') {
            // host:port with a hostname
            return ip_addr.to_string();
        }
        format!("{}:{}", ip_addr, self.snapshot_port)
    }
}
