//! modlink - messaging fabric for networked robot control modules
//!
//! Modules on the fabric exchange tagged byte payloads and remote calls
//! without knowing where their peers live. A multicast name-service scan
//! finds the peers, transports are provisioned per durability class
//! (reliable TCP, best-effort UDP multicast), and the [`Messaging`] core
//! routes every inbound frame into a per-tag queue or through the
//! remote-call correlation table.
//!
//! Typical use:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use modlink::{LinkConfig, MdnsDiscovery, Messaging};
//!
//! # fn main() -> modlink::Result<()> {
//! let config = LinkConfig::default();
//! let discovery = Arc::new(MdnsDiscovery::new(
//!     config.discovery.clone(),
//!     config.transport.clone(),
//! ));
//! let fabric = Messaging::new(&config, discovery)?;
//!
//! fabric.find_connected_modules(Duration::from_secs(5))?;
//! fabric.send(7, 10, b"forward 0.5".to_vec(), true)?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod protocol;
pub mod queue;
pub mod transport;
pub mod version;

pub use config::LinkConfig;
pub use discovery::{Discovery, MdnsDiscovery, ModuleRecord};
pub use error::{Error, Result};
pub use messaging::Messaging;
pub use protocol::{Envelope, ModuleId, ModuleType, Tag, CALL_TAG};
pub use queue::BlockingQueue;
pub use transport::{TcpTransport, TransportClient, TransportKind, UdpTransport};
