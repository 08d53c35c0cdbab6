//! Messaging core
//!
//! Owns the shared inbound queue, the per-tag queues, the transport
//! registries, and the remote-call correlation table. Two background
//! threads do all the work:
//!
//! - the dispatch thread drains the inbound queue, validates each
//!   envelope, and routes its payload into the matching per-tag queue
//!   (or hands call traffic to the completion thread)
//! - the completion thread serves incoming call requests through
//!   registered handlers and matches call responses to waiting callers
//!
//! Both threads poll their queue with a short timeout so a stop request
//! is observed within one poll interval.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::discovery::{Discovery, ModuleMap};
use crate::error::{Error, Result};
use crate::protocol::{
    CallFrame, CallRequest, CallResponse, Envelope, MessageKind, ModuleId, Tag, CALL_TAG,
};
use crate::queue::BlockingQueue;
use crate::transport::{FrameQueue, TransportClient, TransportKind};

/// Serves one incoming remote call: parameters in, result out.
pub type CallHandler = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

enum CallState {
    Waiting,
    Done(Vec<u8>),
}

/// One in-flight remote call, shared between the caller and the
/// completion thread.
struct CallSlot {
    state: Mutex<CallState>,
    signal: Condvar,
}

impl CallSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Waiting),
            signal: Condvar::new(),
        }
    }
}

struct Shared {
    module_id: ModuleId,
    settings: crate::config::MessagingSettings,

    /// Raw frames from every transport receive thread
    inbound: FrameQueue,

    /// Created on demand by either side; dispatch and recv agree on the
    /// queue through this map regardless of who touches a tag first.
    /// Items carry the sender alongside the payload.
    tag_queues: Mutex<HashMap<Tag, Arc<BlockingQueue<(ModuleId, Vec<u8>)>>>>,

    /// Call traffic peeled off the reserved tag, with the envelope
    /// sender preserved for the response path
    calls: Arc<BlockingQueue<(ModuleId, Vec<u8>)>>,

    /// Correlation table of calls awaiting a response
    pending: Mutex<HashMap<u8, Arc<CallSlot>>>,
    next_call_id: AtomicU8,

    /// Local functions callable from remote modules
    handlers: RwLock<HashMap<Tag, CallHandler>>,

    /// Transport per destination, one registry per durability class
    durable: RwLock<HashMap<ModuleId, Arc<dyn TransportClient>>>,
    lossy: RwLock<HashMap<ModuleId, Arc<dyn TransportClient>>>,

    /// Serializes discovery scans; send/recv proceed regardless
    scan_lock: Mutex<()>,

    sequence: AtomicU16,
    stop: AtomicBool,
}

impl Shared {
    fn tag_queue(&self, tag: Tag) -> Arc<BlockingQueue<(ModuleId, Vec<u8>)>> {
        Arc::clone(
            self.tag_queues
                .lock()
                .entry(tag)
                .or_insert_with(|| Arc::new(BlockingQueue::new(self.settings.tag_queue_size))),
        )
    }

    /// Envelope-and-send on whichever registry matches the durability
    /// class. The per-sender sequence covers both classes.
    fn send_frame(
        &self,
        destination: ModuleId,
        tag: Tag,
        payload: Vec<u8>,
        durable: bool,
    ) -> Result<usize> {
        let registry = if durable { &self.durable } else { &self.lossy };
        let client = registry
            .read()
            .get(&destination)
            .cloned()
            .ok_or(Error::NoRoute {
                destination,
                durable,
            })?;

        let envelope = Envelope {
            kind: MessageKind::PointToPoint,
            sender: self.module_id,
            destination,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            durable,
            tag,
            payload,
        };
        client.send_frame(&envelope.encode())
    }

    /// Reserve a free correlation id and park a slot for it.
    fn allocate_call(&self) -> Result<(u8, Arc<CallSlot>)> {
        let mut pending = self.pending.lock();
        let hint = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        for offset in 0..=u8::MAX {
            let id = hint.wrapping_add(offset);
            if let Entry::Vacant(entry) = pending.entry(id) {
                let slot = Arc::new(CallSlot::new());
                entry.insert(Arc::clone(&slot));
                return Ok((id, slot));
            }
        }
        Err(Error::CallTableExhausted)
    }
}

/// The messaging fabric endpoint for one module.
///
/// Dropping it stops and joins the background threads; transports shut
/// their receive threads down in their own `Drop`.
pub struct Messaging {
    shared: Arc<Shared>,
    discovery: Arc<dyn Discovery>,
    dispatch: Option<JoinHandle<()>>,
    completion: Option<JoinHandle<()>>,
}

impl Messaging {
    /// Start the fabric endpoint: queues allocated, dispatch and
    /// completion threads running. No network traffic happens until a
    /// scan or an explicit transport registration.
    pub fn new(config: &LinkConfig, discovery: Arc<dyn Discovery>) -> Result<Self> {
        let settings = config.messaging.clone();
        let shared = Arc::new(Shared {
            module_id: config.module.id,
            inbound: Arc::new(BlockingQueue::new(settings.inbound_queue_size)),
            tag_queues: Mutex::new(HashMap::new()),
            calls: Arc::new(BlockingQueue::new(settings.tag_queue_size)),
            pending: Mutex::new(HashMap::new()),
            next_call_id: AtomicU8::new(0),
            handlers: RwLock::new(HashMap::new()),
            durable: RwLock::new(HashMap::new()),
            lossy: RwLock::new(HashMap::new()),
            scan_lock: Mutex::new(()),
            sequence: AtomicU16::new(0),
            stop: AtomicBool::new(false),
            settings,
        });

        let dispatch = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("modlink-dispatch".to_string())
                .spawn(move || dispatch_loop(shared))?
        };
        let completion = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("modlink-complete".to_string())
                .spawn(move || completion_loop(shared))?
        };

        info!(module = config.module.id, "Messaging core started");
        Ok(Self {
            shared,
            discovery,
            dispatch: Some(dispatch),
            completion: Some(completion),
        })
    }

    /// Id this endpoint stamps as the sender of every envelope.
    pub fn module_id(&self) -> ModuleId {
        self.shared.module_id
    }

    /// The shared inbound queue transports feed. Exposed for manual
    /// transport registration.
    pub fn inbound_queue(&self) -> FrameQueue {
        Arc::clone(&self.shared.inbound)
    }

    /// Current discovery registry snapshot.
    pub fn modules(&self) -> ModuleMap {
        self.discovery.modules()
    }

    /// Send `payload` to `destination` under `tag`.
    ///
    /// `durable` selects the reliable registry; a missing route is an
    /// error, never a silent drop. The reserved call tag is rejected.
    pub fn send(
        &self,
        destination: ModuleId,
        tag: Tag,
        payload: Vec<u8>,
        durable: bool,
    ) -> Result<usize> {
        if tag == CALL_TAG {
            return Err(Error::ReservedTag { tag });
        }
        self.shared.send_frame(destination, tag, payload, durable)
    }

    /// Receive the next message for `tag`, waiting up to the configured
    /// default. Returns the sender id and payload; `None` means nothing
    /// arrived in time.
    pub fn recv(&self, tag: Tag) -> Result<Option<(ModuleId, Vec<u8>)>> {
        self.recv_timeout(tag, self.shared.settings.recv_wait())
    }

    /// Receive with an explicit wait bound.
    pub fn recv_timeout(
        &self,
        tag: Tag,
        timeout: Duration,
    ) -> Result<Option<(ModuleId, Vec<u8>)>> {
        if tag == CALL_TAG {
            return Err(Error::ReservedTag { tag });
        }
        Ok(self.shared.tag_queue(tag).pop(timeout))
    }

    /// Invoke `function_tag` on `destination` and block for the result.
    ///
    /// The call rides the reserved tag over the durable route. Waits at
    /// most the configured call timeout; on timeout the correlation id
    /// is released so a late response is discarded, not misdelivered.
    pub fn remote_call(
        &self,
        destination: ModuleId,
        function_tag: Tag,
        params: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let (call_id, slot) = self.shared.allocate_call()?;

        let request = CallRequest {
            function_tag,
            call_id,
            params,
        }
        .encode();
        if let Err(e) = self.shared.send_frame(destination, CALL_TAG, request, true) {
            self.shared.pending.lock().remove(&call_id);
            return Err(e);
        }

        let deadline = Instant::now() + self.shared.settings.call_timeout();
        let mut state = slot.state.lock();
        while matches!(*state, CallState::Waiting) {
            if slot.signal.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        if let CallState::Done(result) = std::mem::replace(&mut *state, CallState::Waiting) {
            return Ok(result);
        }
        drop(state);

        // Unpark the id, then settle the race with a completion that
        // fired between the timeout and the removal
        self.shared.pending.lock().remove(&call_id);
        let mut state = slot.state.lock();
        if let CallState::Done(result) = std::mem::replace(&mut *state, CallState::Waiting) {
            return Ok(result);
        }
        Err(Error::CallTimeout { destination })
    }

    /// Expose a local function to remote callers under `function_tag`.
    /// Re-registering a tag replaces the previous handler.
    pub fn register_function<F>(&self, function_tag: Tag, handler: F)
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.shared
            .handlers
            .write()
            .insert(function_tag, Arc::new(handler));
        debug!(function_tag, "Registered call handler");
    }

    /// Scan for modules and provision transports for every one found.
    ///
    /// Modules that already hold a client in a registry keep it; new
    /// modules get a fresh client per durability class. Returns the ids
    /// the scan saw.
    pub fn find_connected_modules(&self, scan_duration: Duration) -> Result<HashSet<ModuleId>> {
        let _scan = self.shared.scan_lock.lock();
        let found = self.discovery.find_modules(scan_duration)?;

        let skip: Vec<ModuleId> = self.shared.durable.read().keys().copied().collect();
        let new_durable =
            self.discovery
                .provision(TransportKind::Reliable, self.inbound_queue(), &skip);
        self.shared.durable.write().extend(new_durable);

        let skip: Vec<ModuleId> = self.shared.lossy.read().keys().copied().collect();
        let new_lossy =
            self.discovery
                .provision(TransportKind::BestEffort, self.inbound_queue(), &skip);
        self.shared.lossy.write().extend(new_lossy);

        Ok(found)
    }

    /// Install a transport for `destination` directly, bypassing
    /// discovery. Replaces any existing client for that id and class.
    pub fn register_transport(
        &self,
        destination: ModuleId,
        kind: TransportKind,
        client: Arc<dyn TransportClient>,
    ) {
        let registry = match kind {
            TransportKind::Reliable => &self.shared.durable,
            TransportKind::BestEffort => &self.shared.lossy,
        };
        registry.write().insert(destination, client);
    }
}

impl Drop for Messaging {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.dispatch.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.completion.take() {
            let _ = handle.join();
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Background threads
// ─────────────────────────────────────────────────────────────────

fn dispatch_loop(shared: Arc<Shared>) {
    let poll = shared.settings.poll_interval();
    let enqueue_timeout = shared.settings.tag_enqueue_timeout();

    while !shared.stop.load(Ordering::Relaxed) {
        let Some(frame) = shared.inbound.pop(poll) else {
            continue;
        };

        let envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                continue;
            }
        };

        if envelope.tag == CALL_TAG {
            if shared
                .calls
                .push((envelope.sender, envelope.payload), enqueue_timeout)
                .is_err()
            {
                warn!(sender = envelope.sender, "Call queue full, dropping call frame");
            }
            continue;
        }

        let queue = shared.tag_queue(envelope.tag);
        let tag = envelope.tag;
        let sender = envelope.sender;
        if queue
            .push((envelope.sender, envelope.payload), enqueue_timeout)
            .is_err()
        {
            warn!(tag, sender, "Tag queue full, dropping message");
        }
    }
}

fn completion_loop(shared: Arc<Shared>) {
    let poll = shared.settings.poll_interval();

    while !shared.stop.load(Ordering::Relaxed) {
        let Some((sender, payload)) = shared.calls.pop(poll) else {
            continue;
        };

        match CallFrame::decode(&payload) {
            Err(e) => warn!(sender, error = %e, "Dropping malformed call frame"),
            Ok(CallFrame::Request(request)) => {
                let handler = shared.handlers.read().get(&request.function_tag).cloned();
                let Some(handler) = handler else {
                    warn!(
                        sender,
                        function_tag = request.function_tag,
                        "Call for unregistered function"
                    );
                    continue;
                };

                let result = handler(&request.params);
                let response = CallResponse {
                    call_id: request.call_id,
                    result,
                }
                .encode();
                if let Err(e) = shared.send_frame(sender, CALL_TAG, response, true) {
                    warn!(sender, error = %e, "Failed to answer remote call");
                }
            }
            Ok(CallFrame::Response(response)) => {
                let slot = shared.pending.lock().remove(&response.call_id);
                match slot {
                    Some(slot) => {
                        *slot.state.lock() = CallState::Done(response.result);
                        slot.signal.notify_all();
                    }
                    None => {
                        debug!(
                            sender,
                            call_id = response.call_id,
                            "Discarding response with no pending call"
                        );
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
