use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::stats::NetworkStats;

pub const DEFAULT_MAX_PEERS: usize = 32;
pub const MAX_FRAME_SIZE: usize = 1 << 20;
/// Unsent bytes a peer may hold before it is treated as stalled and dropped.
pub const MAX_OUTBOUND_BUFFER: usize = 4 * MAX_FRAME_SIZE;

const FRAME_HEADER_LEN: usize = 4;
const READ_CHUNK_SIZE: usize = 4096;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The client host talks to exactly one peer.
pub const SERVER_PEER: PeerId = PeerId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u32);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    FrameTooLarge(usize),
    #[error("could not resolve {0}")]
    Unresolved(String),
    #[error("peer is not reading; {0} bytes already waiting")]
    Backlogged(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    Connect(PeerId),
    Receive(PeerId, Vec<u8>),
    Disconnect(PeerId),
}

/// Reliable, ordered delivery towards connected peers.
pub trait Outbound {
    fn send(&mut self, peer: PeerId, data: &[u8]);

    fn broadcast(&mut self, data: &[u8]);
}

/// Receives transport events during `poll`, on the polling thread, one at a time.
pub trait NetHandler {
    fn on_connect(&mut self, out: &mut dyn Outbound, peer: PeerId);

    fn on_receive(&mut self, out: &mut dyn Outbound, peer: PeerId, data: &[u8]);

    fn on_disconnect(&mut self, out: &mut dyn Outbound, peer: PeerId);
}

struct FramedStream {
    stream: TcpStream,
    addr: SocketAddr,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
}

impl FramedStream {
    fn new(stream: TcpStream, addr: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            addr,
            inbound: Vec::new(),
            outbound: Vec::new(),
        })
    }

    fn queue(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge(data.len()));
        }

        let frame_len = FRAME_HEADER_LEN + data.len();
        if self.outbound.len() + frame_len > MAX_OUTBOUND_BUFFER {
            self.flush()?;
            if self.outbound.len() + frame_len > MAX_OUTBOUND_BUFFER {
                return Err(TransportError::Backlogged(self.outbound.len()));
            }
        }

        self.outbound
            .extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.outbound.extend_from_slice(data);
        self.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(written) => {
                    self.outbound.drain(..written);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Appends every complete frame to `frames`; returns false once the peer has closed.
    fn read_frames(&mut self, frames: &mut Vec<Vec<u8>>) -> Result<bool, TransportError> {
        let mut open = true;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    open = false;
                    break;
                }
                Ok(size) => self.inbound.extend_from_slice(&chunk[..size]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        while self.inbound.len() >= FRAME_HEADER_LEN {
            let header = [
                self.inbound[0],
                self.inbound[1],
                self.inbound[2],
                self.inbound[3],
            ];
            let len = u32::from_le_bytes(header) as usize;
            if len > MAX_FRAME_SIZE {
                return Err(TransportError::FrameTooLarge(len));
            }
            if self.inbound.len() < FRAME_HEADER_LEN + len {
                break;
            }

            frames.push(self.inbound[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec());
            self.inbound.drain(..FRAME_HEADER_LEN + len);
        }

        Ok(open)
    }

    fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Drains the stream into events; a closed or broken stream yields its frames and then `None`.
fn service_stream(
    id: PeerId,
    stream: &mut FramedStream,
    stats: &mut NetworkStats,
    events: &mut Vec<NetEvent>,
) -> bool {
    if let Err(e) = stream.flush() {
        log::debug!("Flush to {} failed: {}", stream.addr, e);
        return false;
    }

    let mut frames = Vec::new();
    let open = match stream.read_frames(&mut frames) {
        Ok(open) => open,
        Err(e) => {
            log::debug!("Read from {} failed: {}", stream.addr, e);
            false
        }
    };

    for frame in frames {
        stats.record_received(frame.len());
        events.push(NetEvent::Receive(id, frame));
    }

    open
}

fn dispatch<H: NetHandler + ?Sized>(out: &mut dyn Outbound, handler: &mut H, event: NetEvent) {
    match event {
        NetEvent::Connect(peer) => handler.on_connect(out, peer),
        NetEvent::Receive(peer, data) => handler.on_receive(out, peer, &data),
        NetEvent::Disconnect(peer) => handler.on_disconnect(out, peer),
    }
}

pub struct ServerHost {
    listener: Option<TcpListener>,
    peers: BTreeMap<PeerId, FramedStream>,
    pending: Vec<NetEvent>,
    next_peer_id: u32,
    max_peers: usize,
    stats: NetworkStats,
}

impl Default for ServerHost {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PEERS)
    }
}

impl ServerHost {
    pub fn new(max_peers: usize) -> Self {
        Self {
            listener: None,
            peers: BTreeMap::new(),
            pending: Vec::new(),
            next_peer_id: 1,
            max_peers,
            stats: NetworkStats::default(),
        }
    }

    /// Binds all interfaces on `port`.
    pub fn create(&mut self, port: u16) -> bool {
        self.create_on(("0.0.0.0", port))
    }

    pub fn create_on<A: ToSocketAddrs>(&mut self, addr: A) -> bool {
        let bound = TcpListener::bind(addr).and_then(|listener| {
            listener.set_nonblocking(true)?;
            Ok(listener)
        });

        match bound {
            Ok(listener) => {
                match listener.local_addr() {
                    Ok(addr) => log::info!("Created server host on {}", addr),
                    Err(_) => log::info!("Created server host"),
                }
                self.listener = Some(listener);
                true
            }
            Err(e) => {
                log::error!("Failed to create server host: {}", e);
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Waits up to `timeout_ms` for the first event, then dispatches everything queued.
    pub fn poll<H: NetHandler + ?Sized>(&mut self, timeout_ms: u32, handler: &mut H) -> usize {
        if !self.is_active() {
            return 0;
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut events = std::mem::take(&mut self.pending);
        loop {
            self.collect_events(&mut events);
            if !events.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let count = events.len();
        for event in events {
            dispatch(self, handler, event);
        }
        count
    }

    fn collect_events(&mut self, events: &mut Vec<NetEvent>) {
        self.accept_pending(events);

        let mut closed = Vec::new();
        for (&id, stream) in self.peers.iter_mut() {
            if !service_stream(id, stream, &mut self.stats, events) {
                closed.push(id);
            }
        }

        for id in closed {
            if let Some(stream) = self.peers.remove(&id) {
                log::info!("Peer {} ({}) disconnected", id.0, stream.addr);
                stream.close();
                self.stats.peers_disconnected += 1;
                events.push(NetEvent::Disconnect(id));
            }
        }
    }

    fn accept_pending(&mut self, events: &mut Vec<NetEvent>) {
        let Some(listener) = &self.listener else {
            return;
        };

        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if self.peers.len() >= self.max_peers {
                        log::warn!("Rejecting {}: server full ({} peers)", addr, self.max_peers);
                        let _ = stream.shutdown(Shutdown::Both);
                        self.stats.peers_rejected += 1;
                        continue;
                    }

                    match FramedStream::new(stream, addr) {
                        Ok(stream) => {
                            let id = PeerId(self.next_peer_id);
                            self.next_peer_id = self.next_peer_id.wrapping_add(1).max(1);
                            log::info!("Peer {} connected from {}", id.0, addr);
                            self.peers.insert(id, stream);
                            self.stats.peers_connected += 1;
                            events.push(NetEvent::Connect(id));
                        }
                        Err(e) => log::warn!("Failed to configure stream from {}: {}", addr, e),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Closes one peer; its disconnect event is delivered on the next poll.
    /// Closes one peer; its Disconnect is delivered on the next poll.
    pub fn disconnect_peer(&mut self, peer: PeerId) {
        if let Some(stream) = self.peers.remove(&peer) {
            let _ = stream.flush_and_close();
            self.stats.peers_disconnected += 1;
            self.pending.push(NetEvent::Disconnect(peer));
        }
    }

    /// Closes every peer and stops listening.
    pub fn disconnect(&mut self) {
        for (_, mut stream) in std::mem::take(&mut self.peers) {
            let _ = stream.flush();
            stream.close();
        }
        self.pending.clear();
        if self.listener.take().is_some() {
            log::info!("Server host shut down");
        }
    }
}

impl FramedStream {
    fn flush_and_close(mut self) -> io::Result<()> {
        let result = self.flush();
        self.close();
        result
    }
}

impl Outbound for ServerHost {
    fn send(&mut self, peer: PeerId, data: &[u8]) {
        let Some(stream) = self.peers.get_mut(&peer) else {
            log::trace!("Dropping send to unknown peer {}", peer.0);
            return;
        };

        match stream.queue(data) {
            Ok(()) => self.stats.record_sent(data.len()),
            Err(TransportError::FrameTooLarge(len)) => {
                log::warn!("Dropping {} byte frame to peer {}", len, peer.0)
            }
            Err(e) => {
                log::warn!("Send to peer {} failed: {}", peer.0, e);
                self.disconnect_peer(peer);
            }
        }
    }

    fn broadcast(&mut self, data: &[u8]) {
        let mut failed = Vec::new();
        for (&id, stream) in self.peers.iter_mut() {
            match stream.queue(data) {
                Ok(()) => self.stats.record_sent(data.len()),
                Err(TransportError::FrameTooLarge(len)) => {
                    log::warn!("Dropping {} byte broadcast frame", len);
                    return;
                }
                Err(e) => {
                    log::warn!("Broadcast to peer {} failed: {}", id.0, e);
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.disconnect_peer(id);
        }
    }
}

pub struct ClientHost {
    active: bool,
    server: Option<FramedStream>,
    state: ConnectionState,
    pending: Vec<NetEvent>,
    stats: NetworkStats,
}

impl Default for ClientHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHost {
    pub fn new() -> Self {
        Self {
            active: false,
            server: None,
            state: ConnectionState::Disconnected,
            pending: Vec::new(),
            stats: NetworkStats::default(),
        }
    }

    pub fn create(&mut self) -> bool {
        if !self.active {
            self.active = true;
            log::info!("Created client host");
        }
        true
    }

    pub fn connect(&mut self, address: &str, port: u16) -> bool {
        if !self.active {
            log::warn!("Tried to connect client before the host was created");
            return false;
        }
        if self.server.is_some() {
            log::warn!("Client is already connected");
            return false;
        }

        log::info!("Connecting to {}:{}", address, port);
        match open_stream(address, port) {
            Ok(stream) => {
                self.server = Some(stream);
                self.state = ConnectionState::Connected;
                self.pending.push(NetEvent::Connect(SERVER_PEER));
                true
            }
            Err(e) => {
                log::error!("Failed to connect to {}:{}: {}", address, port, e);
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    pub fn status(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.server.is_some()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn poll<H: NetHandler + ?Sized>(&mut self, timeout_ms: u32, handler: &mut H) -> usize {
        if !self.active {
            return 0;
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut events = std::mem::take(&mut self.pending);
        loop {
            self.collect_events(&mut events);
            if !events.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let count = events.len();
        for event in events {
            dispatch(self, handler, event);
        }
        if self.server.is_none() {
            self.state = ConnectionState::Disconnected;
        }
        count
    }

    fn collect_events(&mut self, events: &mut Vec<NetEvent>) {
        let Some(stream) = self.server.as_mut() else {
            return;
        };

        if !service_stream(SERVER_PEER, stream, &mut self.stats, events) {
            log::info!("Connection to {} closed", stream.addr);
            stream.close();
            self.server = None;
            self.state = ConnectionState::Disconnected;
            events.push(NetEvent::Disconnect(SERVER_PEER));
        }
    }

    pub fn send_packet(&mut self, data: &[u8]) {
        self.send(SERVER_PEER, data);
    }

    /// Safe to call repeatedly; the disconnect event is delivered on the next poll.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.server.take() {
            self.state = ConnectionState::Disconnecting;
            let _ = stream.flush_and_close();
            self.pending.push(NetEvent::Disconnect(SERVER_PEER));
        }
    }
}

impl Outbound for ClientHost {
    fn send(&mut self, _peer: PeerId, data: &[u8]) {
        let Some(stream) = self.server.as_mut() else {
            return;
        };

        match stream.queue(data) {
            Ok(()) => self.stats.record_sent(data.len()),
            Err(e) => log::debug!("Send to server failed: {}", e),
        }
    }

    fn broadcast(&mut self, data: &[u8]) {
        self.send(SERVER_PEER, data);
    }
}

fn open_stream(address: &str, port: u16) -> Result<FramedStream, TransportError> {
    let addr = (address, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| TransportError::Unresolved(format!("{}:{}", address, port)))?;
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
    Ok(FramedStream::new(stream, addr)?)
}
