//! Multicast name-service discovery
//!
//! A scan repeatedly multicasts one service query and collects every
//! response that arrives while it runs, then atomically replaces the
//! module registry with what the scan saw. Readers always observe one
//! coherent generation; a module missing from the latest scan is gone
//! from the registry.

pub mod packet;

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{DiscoverySettings, TransportSettings};
use crate::error::Result;
use crate::protocol::{ModuleId, ModuleType};
use crate::transport::{FrameQueue, TcpTransport, TransportClient, TransportKind, UdpTransport};

/// Number of query rounds spread across one scan window.
const QUERY_ROUNDS: u32 = 5;

/// Everything a scan learns about one remote module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub ip: Ipv4Addr,
    pub hostname: String,
    pub module_type: ModuleType,
    /// Modules reachable through this one, from its TXT advertisement
    pub connected: Vec<ModuleId>,
}

/// Immutable snapshot of the registry, one scan generation.
pub type ModuleMap = Arc<HashMap<ModuleId, ModuleRecord>>;

/// Discovery backend used by the messaging core.
pub trait Discovery: Send + Sync {
    /// Scan the network for `scan_duration` and replace the registry
    /// with the modules that answered. Returns the ids seen.
    fn find_modules(&self, scan_duration: Duration) -> Result<HashSet<ModuleId>>;

    /// Build one transport client per discovered module, keyed by every
    /// id it serves (its own plus its advertised connected modules).
    /// Ids listed in `skip` keep their existing clients.
    fn provision(
        &self,
        kind: TransportKind,
        rx_queue: FrameQueue,
        skip: &[ModuleId],
    ) -> HashMap<ModuleId, Arc<dyn TransportClient>>;

    /// Current registry snapshot.
    fn modules(&self) -> ModuleMap;
}

/// mDNS-style discovery over a one-shot query socket.
pub struct MdnsDiscovery {
    discovery: DiscoverySettings,
    transport: TransportSettings,
    registry: RwLock<ModuleMap>,
}

impl MdnsDiscovery {
    pub fn new(discovery: DiscoverySettings, transport: TransportSettings) -> Self {
        Self {
            discovery,
            transport,
            registry: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Collect raw response datagrams for the scan window, querying at
    /// the start of each round.
    fn collect_responses(&self, scan_duration: Duration) -> Result<Vec<Vec<u8>>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        if let Err(e) = socket.join_multicast_v4(&self.discovery.group, &Ipv4Addr::UNSPECIFIED) {
            // Unicast responses still reach the query socket
            warn!(error = %e, "Could not join discovery group, relying on unicast responses");
        }

        let query = packet::build_query(&self.discovery.service_name);
        let target = SocketAddr::from((self.discovery.group, self.discovery.port));
        let round = (scan_duration / QUERY_ROUNDS).max(Duration::from_millis(1));
        let recv_timeout = Duration::from_millis(self.discovery.recv_timeout_ms);

        let mut responses = Vec::new();
        let mut buf = vec![0u8; 2048];
        let deadline = Instant::now() + scan_duration;

        while Instant::now() < deadline {
            if let Err(e) = socket.send_to(&query, target) {
                warn!(error = %e, "Discovery query send failed");
            }

            let round_deadline = (Instant::now() + round).min(deadline);
            loop {
                let remaining = round_deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                socket.set_read_timeout(Some(remaining.min(recv_timeout)))?;
                match socket.recv_from(&mut buf) {
                    Ok((n, _)) => responses.push(buf[..n].to_vec()),
                    Err(e) if is_timeout(&e) => {}
                    Err(e) => {
                        debug!(error = %e, "Discovery receive error");
                        break;
                    }
                }
            }
        }

        Ok(responses)
    }

    #[cfg(test)]
    fn set_modules(&self, records: Vec<ModuleRecord>) {
        let map: HashMap<ModuleId, ModuleRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();
        *self.registry.write() = Arc::new(map);
    }
}

impl Discovery for MdnsDiscovery {
    fn find_modules(&self, scan_duration: Duration) -> Result<HashSet<ModuleId>> {
        let responses = self.collect_responses(scan_duration)?;

        let mut map: HashMap<ModuleId, ModuleRecord> = HashMap::new();
        for response in &responses {
            match packet::parse_response(response, &self.discovery.service_marker) {
                Ok(record) => {
                    debug!(
                        module = record.id,
                        ip = %record.ip,
                        module_type = %record.module_type,
                        "Discovered module"
                    );
                    map.insert(record.id, record);
                }
                Err(e) => debug!(error = %e, "Ignoring response"),
            }
        }

        let ids: HashSet<ModuleId> = map.keys().copied().collect();
        info!(
            responses = responses.len(),
            modules = ids.len(),
            "Discovery scan complete"
        );

        *self.registry.write() = Arc::new(map);
        Ok(ids)
    }

    fn provision(
        &self,
        kind: TransportKind,
        rx_queue: FrameQueue,
        skip: &[ModuleId],
    ) -> HashMap<ModuleId, Arc<dyn TransportClient>> {
        let snapshot = self.modules();
        let mut clients: HashMap<ModuleId, Arc<dyn TransportClient>> = HashMap::new();

        // All best-effort traffic rides one multicast channel, so one
        // client (one RX port binding) serves every destination
        let mut shared_udp: Option<Arc<dyn TransportClient>> = None;

        for (id, record) in snapshot.iter() {
            if skip.contains(id) {
                continue;
            }

            let client: Arc<dyn TransportClient> = match kind {
                TransportKind::Reliable => {
                    let client: Arc<dyn TransportClient> = Arc::new(TcpTransport::new(
                        SocketAddr::from((record.ip, self.transport.tcp_port)),
                        Arc::clone(&rx_queue),
                        self.transport.clone(),
                    ));
                    // A failed link is still registered; sends report
                    // the connection error instead of a missing route
                    if let Err(e) = client.init() {
                        warn!(module = *id, kind = ?kind, error = %e, "Transport init failed");
                    }
                    client
                }
                TransportKind::BestEffort => Arc::clone(shared_udp.get_or_insert_with(|| {
                    let client: Arc<dyn TransportClient> = Arc::new(UdpTransport::new(
                        Arc::clone(&rx_queue),
                        self.transport.clone(),
                    ));
                    if let Err(e) = client.init() {
                        warn!(kind = ?kind, error = %e, "Transport init failed");
                    }
                    client
                })),
            };

            // The direct peer routes traffic for everything behind it
            for relayed in &record.connected {
                clients.insert(*relayed, Arc::clone(&client));
            }
            clients.insert(*id, client);
        }

        clients
    }

    fn modules(&self) -> ModuleMap {
        Arc::clone(&self.registry.read())
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::BlockingQueue;

    fn discovery_with_records(records: Vec<ModuleRecord>) -> MdnsDiscovery {
        let transport = TransportSettings {
            connect_timeout_ms: 50,
            socket_timeout_ms: 50,
            ..TransportSettings::default()
        };
        let discovery = MdnsDiscovery::new(DiscoverySettings::default(), transport);
        discovery.set_modules(records);
        discovery
    }

    fn record(id: ModuleId, connected: Vec<ModuleId>) -> ModuleRecord {
        ModuleRecord {
            id,
            ip: Ipv4Addr::LOCALHOST,
            hostname: format!("module{}._robotcontrol._tcp.local", id),
            module_type: ModuleType::Sensor,
            connected,
        }
    }

    #[test]
    fn test_registry_starts_empty() {
        let discovery =
            MdnsDiscovery::new(DiscoverySettings::default(), TransportSettings::default());
        assert!(discovery.modules().is_empty());
    }

    #[test]
    fn test_snapshot_is_stable_across_replacement() {
        let discovery = discovery_with_records(vec![record(1, vec![])]);
        let before = discovery.modules();

        discovery.set_modules(vec![record(2, vec![])]);

        // The old snapshot is untouched, the new one is the replacement
        assert!(before.contains_key(&1));
        assert!(!before.contains_key(&2));
        assert!(discovery.modules().contains_key(&2));
        assert!(!discovery.modules().contains_key(&1));
    }

    #[test]
    fn test_provision_fans_out_connected_ids() {
        let discovery = discovery_with_records(vec![record(1, vec![7, 8])]);
        let queue = Arc::new(BlockingQueue::new(4));

        // No listener on localhost:3001, so init fails, but the client
        // is registered anyway
        let clients = discovery.provision(TransportKind::Reliable, queue, &[]);

        assert_eq!(clients.len(), 3);
        assert!(clients.contains_key(&1));
        assert!(clients.contains_key(&7));
        assert!(clients.contains_key(&8));
        assert!(Arc::ptr_eq(&clients[&1], &clients[&7]));
    }

    #[test]
    fn test_provision_shares_one_best_effort_client() {
        let discovery = discovery_with_records(vec![record(1, vec![]), record(2, vec![5])]);
        let queue = Arc::new(BlockingQueue::new(4));

        let clients = discovery.provision(TransportKind::BestEffort, queue, &[]);

        // One multicast channel for all three destinations; a second
        // client would fight over the fixed RX port binding
        assert_eq!(clients.len(), 3);
        assert!(Arc::ptr_eq(&clients[&1], &clients[&2]));
        assert!(Arc::ptr_eq(&clients[&1], &clients[&5]));
    }

    #[test]
    fn test_provision_honors_skip_list() {
        let discovery = discovery_with_records(vec![record(1, vec![]), record(2, vec![])]);
        let queue = Arc::new(BlockingQueue::new(4));

        let clients = discovery.provision(TransportKind::Reliable, queue, &[1]);

        assert!(!clients.contains_key(&1));
        assert!(clients.contains_key(&2));
    }
}
