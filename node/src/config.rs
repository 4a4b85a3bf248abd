//! Startup configuration, loaded from CLI flags or `CHORD_`-prefixed
//! environment variables (mirrors the source's `pydantic_settings`
//! config with the same prefix).

use clap::Parser;

use crate::node::NodeAddr;

pub const DEFAULT_M_BITS: u32 = 10;
pub const DEFAULT_STABILIZE_INTERVAL: f64 = 2.0;
pub const DEFAULT_JOIN_RETRY_INTERVAL: f64 = 5.0;
pub const DEFAULT_RPC_TIMEOUT: f64 = 10.0;
pub const FIND_SUCCESSOR_HOP_LIMIT: u32 = 32;

#[derive(Debug, Clone, Parser)]
#[command(name = "chord-dfs-node", version, about = "Chord DHT distributed file system node")]
pub struct Settings {
    /// Bind address and node-identity source.
    #[arg(long, env = "CHORD_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "CHORD_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Peer to join through. Absence means "form a new ring of size 1."
    #[arg(long, env = "CHORD_BOOTSTRAP_HOST")]
    pub bootstrap_host: Option<String>,

    #[arg(long, env = "CHORD_BOOTSTRAP_PORT")]
    pub bootstrap_port: Option<u16>,

    /// Number of bits in the identifier space.
    #[arg(long, env = "CHORD_M_BITS", default_value_t = DEFAULT_M_BITS)]
    pub m_bits: u32,

    /// Seconds between stabilize ticks.
    #[arg(long, env = "CHORD_STABILIZE_INTERVAL", default_value_t = DEFAULT_STABILIZE_INTERVAL)]
    pub stabilize_interval: f64,

    /// Seconds between join attempts.
    #[arg(long, env = "CHORD_JOIN_RETRY_INTERVAL", default_value_t = DEFAULT_JOIN_RETRY_INTERVAL)]
    pub join_retry_interval: f64,

    /// Per-RPC deadline.
    #[arg(long, env = "CHORD_RPC_TIMEOUT", default_value_t = DEFAULT_RPC_TIMEOUT)]
    pub rpc_timeout: f64,

    /// Directory the local storage backend persists blobs in.
    #[arg(long, env = "CHORD_STORAGE_PATH", default_value = "./storage")]
    pub storage_path: String,

    #[arg(long, env = "CHORD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    pub fn address(&self) -> NodeAddr {
        NodeAddr::new(self.host.clone(), self.port)
    }

    pub fn bootstrap_address(&self) -> Option<NodeAddr> {
        match (&self.bootstrap_host, self.bootstrap_port) {
            (Some(host), Some(port)) => Some(NodeAddr::new(host.clone(), port)),
            _ => None,
        }
    }
}
