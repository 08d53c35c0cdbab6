//! Configuration for the messaging fabric
//!
//! Sources, highest precedence first: CLI arguments, configuration file
//! (TOML), built-in defaults. Every timeout, port, multicast group, and
//! queue bound the fabric uses lives here.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Top-level fabric configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Local module identity
    pub module: ModuleSettings,

    /// Multicast name-service discovery settings
    pub discovery: DiscoverySettings,

    /// Transport (TCP / UDP multicast) settings
    pub transport: TransportSettings,

    /// Queue bounds and messaging timeouts
    pub messaging: MessagingSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Local module identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    /// Module id used as the sender of every outgoing envelope
    pub id: u8,

    /// Human-readable name, for logs only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self { id: 0, name: None }
    }
}

/// Multicast name-service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// mDNS multicast group
    pub group: Ipv4Addr,

    /// mDNS port
    pub port: u16,

    /// Fully qualified service name queried on every scan
    pub service_name: String,

    /// Substring that marks a response as one of ours
    pub service_marker: String,

    /// Per-datagram receive timeout during a scan (ms)
    pub recv_timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(224, 0, 0, 251),
            port: 5353,
            service_name: "_robotcontrol._tcp.local".to_string(),
            service_marker: "_robotcontrol".to_string(),
            recv_timeout_ms: 1000,
        }
    }
}

/// Transport settings shared by the TCP and UDP clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// TCP port modules listen on for reliable links
    pub tcp_port: u16,

    /// Connect timeout for reliable links (ms)
    pub connect_timeout_ms: u64,

    /// Socket read/write timeout (ms); also the stop-flag poll period
    /// of every transport receive thread
    pub socket_timeout_ms: u64,

    /// Largest frame a transport will send or accept
    pub max_frame_bytes: usize,

    /// Multicast group best-effort sends are addressed to
    pub udp_tx_group: Ipv4Addr,

    /// Port best-effort sends are addressed to
    pub udp_tx_port: u16,

    /// Multicast group joined for best-effort receive
    pub udp_rx_group: Ipv4Addr,

    /// Port bound for best-effort receive
    pub udp_rx_port: u16,

    /// How long a receive thread waits for space in the inbound queue
    /// before dropping a frame (ms)
    pub queue_push_timeout_ms: u64,

    /// Sleep after a transient receive error (ms)
    pub error_backoff_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            tcp_port: 3001,
            connect_timeout_ms: 2500,
            socket_timeout_ms: 2500,
            max_frame_bytes: 64 * 1024,
            udp_tx_group: Ipv4Addr::new(239, 1, 1, 1),
            udp_tx_port: 3101,
            udp_rx_group: Ipv4Addr::new(239, 1, 1, 2),
            udp_rx_port: 3100,
            queue_push_timeout_ms: 100,
            error_backoff_ms: 100,
        }
    }
}

/// Queue bounds and messaging timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingSettings {
    /// Capacity of the shared inbound queue
    pub inbound_queue_size: usize,

    /// Capacity of each per-tag queue
    pub tag_queue_size: usize,

    /// Default blocking time of `recv` (ms)
    pub recv_wait_ms: u64,

    /// Dispatch/completion thread poll period; bounds shutdown latency (ms)
    pub poll_interval_ms: u64,

    /// How long the dispatch thread waits for space in a full tag queue (ms)
    pub tag_enqueue_timeout_ms: u64,

    /// Fixed remote-call timeout (ms)
    pub call_timeout_ms: u64,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            inbound_queue_size: 100,
            tag_queue_size: 50,
            recv_wait_ms: 3000,
            poll_interval_ms: 250,
            tag_enqueue_timeout_ms: 250,
            call_timeout_ms: 10_000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Optional log file path (daily rotation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LinkConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: LinkConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        PathBuf::from("/etc/modlink/config.toml")
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.messaging.inbound_queue_size == 0 {
            return Err(Error::config_validation("inbound_queue_size must be non-zero"));
        }
        if self.messaging.tag_queue_size == 0 {
            return Err(Error::config_validation("tag_queue_size must be non-zero"));
        }
        if self.transport.max_frame_bytes == 0 {
            return Err(Error::config_validation("max_frame_bytes must be non-zero"));
        }
        if !self.discovery.group.is_multicast() {
            return Err(Error::config_validation(format!(
                "discovery group {} is not a multicast address",
                self.discovery.group
            )));
        }
        if !self.transport.udp_tx_group.is_multicast() || !self.transport.udp_rx_group.is_multicast()
        {
            return Err(Error::config_validation("UDP groups must be multicast addresses"));
        }
        if self.discovery.service_name.is_empty() || self.discovery.service_marker.is_empty() {
            return Err(Error::config_validation("discovery service name must be set"));
        }
        Ok(())
    }
}

impl MessagingSettings {
    pub fn recv_wait(&self) -> Duration {
        Duration::from_millis(self.recv_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tag_enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.tag_enqueue_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl TransportSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn queue_push_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_push_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
