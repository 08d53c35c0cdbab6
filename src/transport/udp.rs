//! Best-effort transport over UDP multicast
//!
//! Every datagram carries a 4-byte big-endian length prefix followed by
//! at most that many frame bytes; oversized or undersized datagrams are
//! dropped. All best-effort destinations share one multicast channel,
//! so the peer address passed at provisioning time is not used for
//! addressing.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::TransportSettings;
use crate::error::{Error, Result};
use crate::transport::{FrameQueue, TransportClient};

/// Best-effort multicast client.
pub struct UdpTransport {
    settings: TransportSettings,
    tx_socket: Mutex<Option<UdpSocket>>,
    rx_local_addr: Mutex<Option<SocketAddr>>,
    rx_queue: FrameQueue,
    stop: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    pub fn new(rx_queue: FrameQueue, settings: TransportSettings) -> Self {
        Self {
            settings,
            tx_socket: Mutex::new(None),
            rx_local_addr: Mutex::new(None),
            rx_queue,
            stop: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    /// Local address of the receive socket after `init`.
    pub fn rx_local_addr(&self) -> Option<SocketAddr> {
        *self.rx_local_addr.lock()
    }
}

impl TransportClient for UdpTransport {
    fn init(&self) -> Result<()> {
        let tx = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        tx.set_write_timeout(Some(self.settings.socket_timeout()))?;

        let rx = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.settings.udp_rx_port))?;
        rx.join_multicast_v4(&self.settings.udp_rx_group, &Ipv4Addr::UNSPECIFIED)?;
        rx.set_read_timeout(Some(self.settings.socket_timeout()))?;
        *self.rx_local_addr.lock() = Some(rx.local_addr()?);

        let rx_queue = Arc::clone(&self.rx_queue);
        let stop = Arc::clone(&self.stop);
        let max_frame = self.settings.max_frame_bytes;
        let push_timeout = self.settings.queue_push_timeout();
        let backoff = self.settings.error_backoff();

        let handle = thread::Builder::new()
            .name("udp-rx".to_string())
            .spawn(move || receive_loop(rx, rx_queue, stop, max_frame, push_timeout, backoff))?;

        *self.reader.lock() = Some(handle);
        *self.tx_socket.lock() = Some(tx);
        debug!(
            group = %self.settings.udp_rx_group,
            port = self.settings.udp_rx_port,
            "UDP transport joined multicast group"
        );
        Ok(())
    }

    fn send_frame(&self, frame: &[u8]) -> Result<usize> {
        if frame.len() > self.settings.max_frame_bytes {
            return Err(Error::FrameTooLarge {
                size: frame.len(),
                max: self.settings.max_frame_bytes,
            });
        }

        let guard = self.tx_socket.lock();
        let socket = guard.as_ref().ok_or(Error::NotConnected)?;

        let mut datagram = vec![0u8; 4 + frame.len()];
        BigEndian::write_u32(&mut datagram[..4], frame.len() as u32);
        datagram[4..].copy_from_slice(frame);

        let dest = (self.settings.udp_tx_group, self.settings.udp_tx_port);
        socket.send_to(&datagram, dest)?;
        Ok(frame.len())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
    }
}

fn receive_loop(
    socket: UdpSocket,
    rx_queue: FrameQueue,
    stop: Arc<AtomicBool>,
    max_frame: usize,
    push_timeout: Duration,
    backoff: Duration,
) {
    let mut buf = vec![0u8; max_frame + 4];

    while !stop.load(Ordering::Relaxed) {
        let received = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e) => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                if !is_timeout(&e) {
                    debug!(error = %e, "UDP receive error");
                    thread::sleep(backoff);
                }
                continue;
            }
        };

        if received < 4 {
            warn!(received, "Dropping undersized UDP datagram");
            continue;
        }
        let declared = BigEndian::read_u32(&buf[..4]) as usize;
        if declared > received - 4 || declared == 0 {
            warn!(declared, received, "Dropping UDP datagram with bad length prefix");
            continue;
        }

        let frame = buf[4..4 + declared].to_vec();
        if rx_queue.push(frame, push_timeout).is_err() {
            warn!("Inbound queue full, dropping UDP frame");
        }
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
