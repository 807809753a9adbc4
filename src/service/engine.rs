//! The connection engine.
//!
//! One engine owns one socket, one outbound queue + signal and one inbound
//! queue + signal for the lifetime of one connection attempt; a fresh
//! `connect` constructs fresh queues. Reader, writer and handshake each run
//! on the engine's own worker pool:
//!
//! ```text
//! host ──send_packet──▶ tx queue ──writer──▶ socket ──▶ bridge
//! bridge ──▶ socket ──reader──▶ rx queue ──read_packet──▶ host
//! ```
//!
//! The socket's two directions are each touched by exactly one loop, so no
//! lock covers the streams. The rx consumer side is shared between the
//! handshake task and the host, which is why the receiver sits behind a
//! mutex: the lock-free queue demands a single logical consumer.
//!
//! Sessions carry a monotonic generation id. A loop outliving its session
//! (a reconnect installs a successor while the old reader is still parked
//! in a blocking read) compares its id against the current session before
//! touching shared state, so stale loops can never tear down or re-label
//! the link that replaced them.

use crate::config::LinkConfig;
use crate::core::packet::Packet;
use crate::error::{constants, LinkError, Result};
use crate::protocol::handshake::{self, HandshakeVerdict, LinkState, StateCell};
use crate::protocol::registry::PacketRegistry;
use crate::queue::{self, QueueReceiver, QueueSender, Signal};
use crate::utils::metrics::LinkMetrics;
use crate::utils::pool::WorkerPool;
use bytes::BytesMut;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, error, info, trace, warn};

/// Transient read failures tolerated back-to-back before the reader gives up
/// on a half-closed socket.
const MAX_CONSECUTIVE_IO_ERRORS: u32 = 8;

/// Socket-side buffer size, matching the frame sizes this protocol carries.
const STREAM_BUF_SIZE: usize = 1024;

/// Cheap clones of one session's queue endpoints. Every loop job holds one,
/// so a loop always talks to the session that spawned it even after a
/// reconnect has installed a successor.
#[derive(Clone)]
struct SessionPipes {
    /// Session generation; compared against the current session's id before
    /// a loop is allowed to touch engine-wide state.
    id: u64,
    tx: QueueSender<Packet>,
    tx_signal: Arc<Signal>,
    rx: Arc<Mutex<QueueReceiver<Packet>>>,
    rx_signal: Arc<Signal>,
}

struct Session {
    stream: TcpStream,
    pipes: SessionPipes,
}

/// Persistent-connection client for the bridge.
///
/// Construct once, wrap in an [`Arc`], call [`connect`](Self::connect).
/// Teardown is driven by socket closure; call [`shutdown`](Self::shutdown)
/// for a deliberate local close, otherwise the loops stop when the peer
/// vanishes.
pub struct LinkEngine {
    /// Handle to ourselves so loop jobs can hold the engine alive.
    weak: Weak<LinkEngine>,
    config: LinkConfig,
    registry: PacketRegistry,
    pool: WorkerPool,
    state: StateCell,
    metrics: Arc<LinkMetrics>,
    session: Mutex<Option<Session>>,
    session_seq: AtomicU64,
    bridge_info: Mutex<Option<String>>,
    reject_reason: Mutex<Option<String>>,
}

impl LinkEngine {
    /// Build an engine with the built-in packet catalog.
    pub fn new(config: LinkConfig) -> Result<Arc<Self>> {
        Self::with_registry(config, PacketRegistry::with_builtin())
    }

    /// Build an engine around a host-extended registry.
    pub fn with_registry(config: LinkConfig, registry: PacketRegistry) -> Result<Arc<Self>> {
        config.validate_strict()?;
        let pool = WorkerPool::new("bridgelink-net", config.client.workers)?;
        Ok(Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config,
            registry,
            pool,
            state: StateCell::new(LinkState::Idle),
            metrics: Arc::new(LinkMetrics::new()),
            session: Mutex::new(None),
            session_seq: AtomicU64::new(0),
            bridge_info: Mutex::new(None),
            reject_reason: Mutex::new(None),
        }))
    }

    /// Current connection state.
    pub fn state(&self) -> LinkState {
        self.state.load()
    }

    /// Info string the bridge sent in `Advance`, once established.
    pub fn bridge_info(&self) -> Option<String> {
        self.bridge_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reason the bridge sent in `Disconnect`, once rejected.
    pub fn reject_reason(&self) -> Option<String> {
        self.reject_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// This engine's metrics counters.
    pub fn metrics(&self) -> &LinkMetrics {
        &self.metrics
    }

    /// Open the link. Fire-and-forget: the socket open, the I/O loops and
    /// the handshake all run on the engine's pool. Failures are logged and
    /// recorded in metrics; retrying is the supervisor's call, not ours.
    ///
    /// Calling this on an engine with a live session tears that session
    /// down and replaces it with a fresh one.
    pub fn connect(&self) {
        // Always upgradable: we are alive, and new() only hands out Arcs.
        let Some(engine) = self.weak.upgrade() else {
            return;
        };
        self.state.store(LinkState::Connecting);
        self.pool.execute(move || engine.run_connect());
    }

    /// Enqueue `packet` for the writer loop.
    ///
    /// # Errors
    /// [`LinkError::NotConnected`] when no session exists;
    /// [`LinkError::ConnectionClosed`] when the session has been torn down.
    pub fn send_packet(&self, packet: Packet) -> Result<()> {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let session = session.as_ref().ok_or(LinkError::NotConnected)?;
        if session.pipes.tx_signal.is_closed() {
            return Err(LinkError::ConnectionClosed);
        }
        if session.pipes.tx.send(packet) {
            session.pipes.tx_signal.raise();
        }
        Ok(())
    }

    /// Block until one inbound packet is available and return it.
    ///
    /// Returns `None` when interrupted by teardown (signal closed) or when
    /// no session exists.
    pub fn read_packet(&self) -> Option<Packet> {
        let pipes = {
            let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            session.as_ref()?.pipes.clone()
        };
        Self::pipe_read(&pipes)
    }

    fn pipe_read(pipes: &SessionPipes) -> Option<Packet> {
        loop {
            if !pipes.rx_signal.wait() {
                return None;
            }
            let mut rx = pipes.rx.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(packet) = rx.take_next() {
                // Signal units are raised only on empty transitions, so a
                // backlog left behind carries no unit of its own; re-raise
                // to keep units >= queued items for the next waiter.
                if !rx.is_empty() {
                    pipes.rx_signal.raise();
                }
                return Some(packet);
            }
            // Stale unit from an earlier re-raise; wait again.
        }
    }

    /// Deliberate local teardown: shuts the socket down, wakes every waiter
    /// and moves to `Closed` (a `Rejected` verdict is preserved).
    pub fn shutdown(&self) {
        self.teardown_session();
        if self.state.load() != LinkState::Rejected {
            self.state.store(LinkState::Closed);
        }
    }

    fn run_connect(self: Arc<Self>) {
        // A fresh attempt gets fresh queues; tear down any previous session.
        self.teardown_session();

        let stream = match self.open_socket() {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, addr = %self.config.bridge.address, "could not connect to bridge");
                self.metrics.connection_failed();
                self.state.store(LinkState::Idle);
                return;
            }
        };
        info!(addr = %self.config.bridge.address, "connected to bridge");

        let (reader_stream, writer_stream) = match (stream.try_clone(), stream.try_clone()) {
            (Ok(r), Ok(w)) => (r, w),
            _ => {
                error!("{}", constants::ERR_STREAM_CLONE);
                self.metrics.connection_failed();
                self.state.store(LinkState::Idle);
                return;
            }
        };

        let (tx_send, tx_recv) = queue::channel::<Packet>();
        let (rx_send, rx_recv) = queue::channel::<Packet>();
        let pipes = SessionPipes {
            id: self.session_seq.fetch_add(1, Ordering::Relaxed),
            tx: tx_send,
            tx_signal: Arc::new(Signal::new()),
            rx: Arc::new(Mutex::new(rx_recv)),
            rx_signal: Arc::new(Signal::new()),
        };

        {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            *session = Some(Session {
                stream,
                pipes: pipes.clone(),
            });
        }
        self.state.store(LinkState::Connected);
        self.metrics.connection_established();

        debug!(session = pipes.id, "starting network loops");
        let engine = Arc::clone(&self);
        let reader_pipes = pipes.clone();
        self.pool
            .execute(move || engine.run_reader(reader_stream, rx_send, reader_pipes));
        let engine = Arc::clone(&self);
        let writer_pipes = pipes.clone();
        self.pool
            .execute(move || engine.run_writer(writer_stream, tx_recv, writer_pipes));
        let engine = Arc::clone(&self);
        self.pool.execute(move || engine.run_handshake(pipes));
    }

    fn open_socket(&self) -> Result<TcpStream> {
        let addr: SocketAddr = self
            .config
            .bridge
            .address
            .parse()
            .map_err(|e| LinkError::ConfigError(format!("bad bridge address: {e}")))?;
        let stream = TcpStream::connect_timeout(&addr, self.config.bridge.connect_timeout)
            .map_err(|e| LinkError::ConnectFailure(e.to_string()))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Drain the socket into the rx queue, one frame at a time.
    fn run_reader(self: Arc<Self>, stream: TcpStream, rx: QueueSender<Packet>, pipes: SessionPipes) {
        let mut reader = BufReader::with_capacity(STREAM_BUF_SIZE, stream);
        let mut consecutive_errors = 0u32;
        let mut byte = [0u8; 1];

        loop {
            match reader.read(&mut byte) {
                Ok(0) => {
                    info!("bridge closed the connection");
                    break;
                }
                Ok(_) => {
                    consecutive_errors = 0;
                    let id = byte[0];
                    if id == 0 {
                        // Keep-alive padding; also keeps a stray zero from
                        // being mistaken for Connect, which has no decoder.
                        trace!("skipping padding byte");
                        continue;
                    }
                    match self.registry.decode(id, &mut reader) {
                        Ok(packet) => {
                            self.metrics.packet_received();
                            if rx.send(packet) {
                                pipes.rx_signal.raise();
                            }
                        }
                        Err(LinkError::Io(e)) if is_fatal_io(&e) => {
                            error!(error = %e, "fatal read failure mid-frame");
                            self.metrics.io_error();
                            break;
                        }
                        Err(e) => {
                            warn!(discriminant = id, error = %e, "dropping malformed frame");
                            self.metrics.frame_dropped();
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.metrics.io_error();
                    if is_fatal_io(&e) {
                        error!(error = %e, "fatal read failure");
                        break;
                    }
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_IO_ERRORS {
                        error!(errors = consecutive_errors, "persistent read failures, giving up");
                        break;
                    }
                    warn!(error = %e, "transient read failure");
                }
            }
        }

        debug!(session = pipes.id, "reader loop stopped");
        self.close_link_for(pipes.id);
    }

    /// Drain the tx queue onto the socket. One signal unit may cover several
    /// queued packets, so each wakeup drains until the queue reports empty.
    fn run_writer(
        self: Arc<Self>,
        mut stream: TcpStream,
        mut tx: QueueReceiver<Packet>,
        pipes: SessionPipes,
    ) {
        let mut buf = BytesMut::with_capacity(STREAM_BUF_SIZE);

        while pipes.tx_signal.wait() {
            while let Some(packet) = tx.take_next() {
                buf.clear();
                packet.encode(&mut buf);
                match stream.write_all(&buf).and_then(|()| stream.flush()) {
                    Ok(()) => {
                        self.metrics.packet_sent(buf.len() as u64);
                        trace!(bytes = buf.len(), "frame written");
                    }
                    Err(e) => {
                        self.metrics.io_error();
                        if is_fatal_io(&e) {
                            error!(error = %e, "fatal write failure");
                            debug!(session = pipes.id, "writer loop stopped");
                            self.close_link_for(pipes.id);
                            return;
                        }
                        warn!(error = %e, "transient write failure, frame lost");
                    }
                }
            }
        }

        debug!(session = pipes.id, "writer loop stopped");
    }

    /// Send `Connect{identity}` and act on the bridge's verdict.
    ///
    /// Talks exclusively through its own session's pipes; engine-wide state
    /// is only touched while this session is still the current one.
    fn run_handshake(self: Arc<Self>, pipes: SessionPipes) {
        {
            let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            if !is_current(&session, pipes.id) {
                debug!(session = pipes.id, "session superseded before handshake start");
                return;
            }
            self.state.store(LinkState::Handshaking);
        }

        if pipes.tx_signal.is_closed() {
            debug!(session = pipes.id, "session torn down before handshake start");
            return;
        }
        if pipes.tx.send(handshake::initiate(&self.config.client.identity)) {
            pipes.tx_signal.raise();
        }
        debug!(identity = %self.config.client.identity, "Connect sent, awaiting verdict");

        match handshake::resolve(Self::pipe_read(&pipes)) {
            HandshakeVerdict::Accepted { bridge_info } => {
                let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
                if is_current(&session, pipes.id) {
                    info!(bridge = %bridge_info, "handshake complete, session established");
                    *self
                        .bridge_info
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(bridge_info);
                    self.state.store(LinkState::Established);
                } else {
                    debug!(session = pipes.id, "verdict for a superseded session, ignoring");
                }
            }
            HandshakeVerdict::Rejected { reason } => {
                let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
                if is_current(&session, pipes.id) {
                    warn!(reason = %reason, "bridge rejected the session");
                    *self
                        .reject_reason
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(reason);
                    self.state.store(LinkState::Rejected);
                    if let Some(session) = session.take() {
                        teardown(&session);
                    }
                } else {
                    debug!(session = pipes.id, "verdict for a superseded session, ignoring");
                }
            }
            HandshakeVerdict::Anomaly { reply } => {
                // Unhandled in this protocol revision; stay in Handshaking.
                warn!(?reply, "unexpected handshake reply");
            }
        }
    }

    /// Deliberate teardown of the current session, whatever its generation.
    /// Leaves the engine with no session, so the host-facing API reports
    /// `NotConnected` rather than a half-alive `ConnectionClosed`.
    fn teardown_session(&self) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = session.take() {
            teardown(&session);
        }
    }

    /// Loop exit path. Tears the link down only when `session_id` is still
    /// the current session; a loop outliving a reconnect must not touch the
    /// session that replaced its own.
    fn close_link_for(&self, session_id: u64) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if !is_current(&session, session_id) {
            debug!(session = session_id, "loop for a superseded session exited");
            return;
        }
        if let Some(session) = session.take() {
            teardown(&session);
        }
        // A rejection verdict is the more precise terminal state.
        if self.state.load() != LinkState::Rejected {
            self.state.store(LinkState::Closed);
        }
    }
}

fn is_current(session: &Option<Session>, id: u64) -> bool {
    session.as_ref().map(|s| s.pipes.id) == Some(id)
}

/// Shut the session's socket down and wake every waiter.
fn teardown(session: &Session) {
    let _ = session.stream.shutdown(Shutdown::Both);
    session.pipes.tx_signal.close();
    session.pipes.rx_signal.close();
}

fn is_fatal_io(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
