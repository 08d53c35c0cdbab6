//! Reliable-ordered transport over TCP
//!
//! Wire format: [4-byte big-endian length][frame bytes]. The receive
//! thread reads complete frames and pushes them into the shared
//! inbound queue; transient errors sleep a backoff and retry, so a
//! flaky link never kills the thread.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::TransportSettings;
use crate::error::{Error, Result};
use crate::transport::{FrameQueue, TransportClient};

/// Reliable client for one peer module.
pub struct TcpTransport {
    addr: SocketAddr,
    settings: TransportSettings,
    stream: Mutex<Option<TcpStream>>,
    rx_queue: FrameQueue,
    stop: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Create a client addressed at `addr`. No connection is made until
    /// [`init`](TransportClient::init).
    pub fn new(addr: SocketAddr, rx_queue: FrameQueue, settings: TransportSettings) -> Self {
        Self {
            addr,
            settings,
            stream: Mutex::new(None),
            rx_queue,
            stop: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }
}

impl TransportClient for TcpTransport {
    fn init(&self) -> Result<()> {
        let stream = TcpStream::connect_timeout(&self.addr, self.settings.connect_timeout())?;
        stream.set_read_timeout(Some(self.settings.socket_timeout()))?;
        stream.set_write_timeout(Some(self.settings.socket_timeout()))?;
        stream.set_nodelay(true)?;

        let reader_stream = stream.try_clone()?;
        let rx_queue = Arc::clone(&self.rx_queue);
        let stop = Arc::clone(&self.stop);
        let max_frame = self.settings.max_frame_bytes;
        let push_timeout = self.settings.queue_push_timeout();
        let backoff = self.settings.error_backoff();
        let addr = self.addr;

        let handle = thread::Builder::new()
            .name(format!("tcp-rx-{}", addr))
            .spawn(move || {
                receive_loop(reader_stream, rx_queue, stop, max_frame, push_timeout, backoff)
            })?;

        *self.reader.lock() = Some(handle);
        *self.stream.lock() = Some(stream);
        debug!(addr = %self.addr, "TCP transport connected");
        Ok(())
    }

    fn send_frame(&self, frame: &[u8]) -> Result<usize> {
        if frame.len() > self.settings.max_frame_bytes {
            return Err(Error::FrameTooLarge {
                size: frame.len(),
                max: self.settings.max_frame_bytes,
            });
        }

        let mut guard = self.stream.lock();
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;
        stream.write_u32::<BigEndian>(frame.len() as u32)?;
        stream.write_all(frame)?;
        stream.flush()?;
        Ok(frame.len())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(stream) = self.stream.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
    }
}

fn receive_loop(
    mut stream: TcpStream,
    rx_queue: FrameQueue,
    stop: Arc<AtomicBool>,
    max_frame: usize,
    push_timeout: Duration,
    backoff: Duration,
) {
    let peer = stream.peer_addr().ok();

    while !stop.load(Ordering::Relaxed) {
        let mut len_buf = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut len_buf) {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            // Read timeouts are just the stop-flag poll period expiring
            if !is_timeout(&e) {
                debug!(peer = ?peer, error = %e, "TCP receive error");
                thread::sleep(backoff);
            }
            continue;
        }

        let len = BigEndian::read_u32(&len_buf) as usize;
        if len == 0 || len > max_frame {
            warn!(peer = ?peer, len, "Dropping TCP frame with bad length");
            thread::sleep(backoff);
            continue;
        }

        let mut frame = vec![0u8; len];
        if let Err(e) = stream.read_exact(&mut frame) {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            debug!(peer = ?peer, error = %e, "TCP receive error mid-frame");
            thread::sleep(backoff);
            continue;
        }

        if rx_queue.push(frame, push_timeout).is_err() {
            warn!(peer = ?peer, "Inbound queue full, dropping TCP frame");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::BlockingQueue;
    use std::net::TcpListener;

    fn test_settings() -> TransportSettings {
        TransportSettings {
            socket_timeout_ms: 100,
            ..TransportSettings::default()
        }
    }

    #[test]
    fn test_send_before_init_fails() {
        let queue = Arc::new(BlockingQueue::new(4));
        let transport = TcpTransport::new(
            "127.0.0.1:1".parse().unwrap(),
            queue,
            test_settings(),
        );
        assert!(matches!(
            transport.send_frame(&[1, 2, 3]),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_frame_roundtrip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(BlockingQueue::new(4));

        let transport = TcpTransport::new(addr, Arc::clone(&queue), test_settings());
        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();

            // Expect one framed message from the client
            let mut len_buf = [0u8; 4];
            peer.read_exact(&mut len_buf).unwrap();
            let len = BigEndian::read_u32(&len_buf) as usize;
            let mut body = vec![0u8; len];
            peer.read_exact(&mut body).unwrap();
            assert_eq!(body, b"ping");

            // Answer with a framed message of our own
            peer.write_u32::<BigEndian>(4).unwrap();
            peer.write_all(b"pong").unwrap();
        });

        transport.init().unwrap();
        assert_eq!(transport.send_frame(b"ping").unwrap(), 4);

        let frame = queue.pop(Duration::from_secs(2)).expect("no frame received");
        assert_eq!(frame, b"pong");
        server.join().unwrap();
    }

    #[test]
    fn test_oversized_send_rejected() {
        let queue = Arc::new(BlockingQueue::new(4));
        let mut settings = test_settings();
        settings.max_frame_bytes = 8;
        let transport = TcpTransport::new("127.0.0.1:1".parse().unwrap(), queue, settings);
        assert!(matches!(
            transport.send_frame(&[0u8; 9]),
            Err(Error::FrameTooLarge { size: 9, max: 8 })
        ));
    }
}
