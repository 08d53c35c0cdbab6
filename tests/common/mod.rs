//! Common test utilities and fixtures
//!
//! In-process loopback transports so two fabric endpoints can talk
//! without sockets: a send on one side lands in the other side's
//! inbound queue, exactly as a transport receive thread would deliver
//! it.

use std::sync::Arc;
use std::time::Duration;

use modlink::config::LinkConfig;
use modlink::error::Result;
use modlink::transport::{FrameQueue, TransportClient, TransportKind};
use modlink::{MdnsDiscovery, Messaging};

/// Transport that delivers frames straight into a peer's inbound queue.
pub struct LoopbackTransport {
    peer_inbound: FrameQueue,
}

impl LoopbackTransport {
    pub fn new(peer_inbound: FrameQueue) -> Arc<Self> {
        Arc::new(Self { peer_inbound })
    }
}

impl TransportClient for LoopbackTransport {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn send_frame(&self, frame: &[u8]) -> Result<usize> {
        self.peer_inbound
            .push(frame.to_vec(), Duration::from_secs(1))
            .map_err(|_| modlink::Error::NotConnected)?;
        Ok(frame.len())
    }
}

/// Build a fabric endpoint with fast test timings and no network use.
pub fn endpoint(module_id: u8) -> Messaging {
    let mut config = LinkConfig::default();
    config.module.id = module_id;
    config.messaging.poll_interval_ms = 20;
    config.messaging.recv_wait_ms = 2000;
    config.messaging.call_timeout_ms = 2000;

    let discovery = Arc::new(MdnsDiscovery::new(
        config.discovery.clone(),
        config.transport.clone(),
    ));
    Messaging::new(&config, discovery).expect("endpoint start")
}

/// Two endpoints wired to each other over loopback transports, both
/// durability classes registered in both directions.
pub fn linked_pair(left_id: u8, right_id: u8) -> (Messaging, Messaging) {
    let left = endpoint(left_id);
    let right = endpoint(right_id);

    let to_right = LoopbackTransport::new(right.inbound_queue());
    let to_left = LoopbackTransport::new(left.inbound_queue());

    for kind in [TransportKind::Reliable, TransportKind::BestEffort] {
        left.register_transport(right_id, kind, to_right.clone());
        right.register_transport(left_id, kind, to_left.clone());
    }

    (left, right)
}
