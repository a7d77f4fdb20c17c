// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The edge state machine and the reactor that drives it.
//!
//! Protocol state here is tagged variants and pure transition functions:
//! [`EdgeState`] and [`PeerState`] (the latter lives on
//! [`crate::peer::PeerInfo`]) move only through the functions in this
//! module, each returning the next state plus the [`EdgeAction`]s it
//! implies, so the logic is testable without a socket in sight.
//! [`EdgeRuntime`] is the thin shell that executes those actions against
//! real collaborators each reactor tick, following an init -> run loop ->
//! shutdown lifecycle.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use mio::net::UdpSocket;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::codec::{self, N2nMessage};
use crate::config::EdgeConfig;
use crate::error::EdgeError;
use crate::mac::Mac;
use crate::mgmt::request::{self, Route};
use crate::mgmt::{EdgeMetrics, SlotPool, SlotState};
use crate::peer::{OnMiss, PeerState, PeerTable};
use crate::rand::SecureRandom;
use crate::resolver::{Resolve, Resolver, SystemResolve};
use crate::sock::N2nSock;
use crate::supernode::{Supernode, SupernodeList, SELECTION_CRITERION_TIMEOUT_PENALTY};
use crate::tap::Tap;
use crate::timestamp::TimeStampGenerator;
use crate::transform::{NullTransform, Transform};

const TAP_TOKEN: Token = Token(usize::MAX - 1);
const UDP_TOKEN: Token = Token(usize::MAX - 2);
/// Management listener/slot tokens occupy the low end of the token space
/// (see `mgmt::pool`); anything below this bound is handed to the pool.
const MGMT_TOKEN_CEILING: usize = 4096;

/// Global registration state with the overlay's supernode(s).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum EdgeState {
    #[default]
    Boot,
    SupernodeRegistering,
    Online,
    ReRegistering,
}

/// A non-packet control message, independent of the borrowed wire type so
/// transition functions can hand one back without tying their return value
/// to a buffer's lifetime.
#[derive(Clone, Debug)]
pub enum ControlMessage {
    Register { src_mac: Mac, dst_mac: Mac, timestamp: u64 },
    Deregister { src_mac: Mac },
    RegisterAck { src_mac: Mac, dst_mac: Mac },
    RegisterSuper { src_mac: Mac, timestamp: u64 },
    RegisterSuperAck { src_mac: Mac, timestamp: u64 },
    RegisterSuperNak { src_mac: Mac },
}

impl ControlMessage {
    fn as_wire(&self) -> N2nMessage<'_> {
        match *self {
            Self::Register { src_mac, dst_mac, timestamp } => N2nMessage::Register { src_mac, dst_mac, timestamp },
            Self::Deregister { src_mac } => N2nMessage::Deregister { src_mac },
            Self::RegisterAck { src_mac, dst_mac } => N2nMessage::RegisterAck { src_mac, dst_mac },
            Self::RegisterSuper { src_mac, timestamp } => N2nMessage::RegisterSuper { src_mac, timestamp },
            Self::RegisterSuperAck { src_mac, timestamp } => N2nMessage::RegisterSuperAck { src_mac, timestamp },
            Self::RegisterSuperNak { src_mac } => N2nMessage::RegisterSuperNak { src_mac },
        }
    }
}

/// Something a transition function wants done, left for [`EdgeRuntime`] to
/// actually carry out against the socket, peer table, and supernode list.
#[derive(Clone, Debug)]
pub enum EdgeAction {
    SendControl { to: N2nSock, message: ControlMessage },
    SendPacket { to: N2nSock, src_mac: Mac, dst_mac: Mac, transform_id: u16, payload: Vec<u8> },
    WriteTap(Vec<u8>),
    PenalizeCurrentSupernode,
    RewardSupernode(N2nSock),
    UpsertPeerState { mac: Mac, state: PeerState },
    RemovePeer(Mac),
}

/// Where a TAP → network frame should go, per `spec.md` §4.8's forwarding
/// rules.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ForwardDecision {
    DirectToPeer(N2nSock),
    FloodToRegisteredPeers(Vec<N2nSock>),
    ViaSupernode(N2nSock),
    Drop,
}

/// `edge_on_register_super_ack`: a valid ACK always brings the edge online
/// and rewards the supernode it came from.
pub fn edge_on_register_super_ack(_state: EdgeState, from: N2nSock) -> (EdgeState, Vec<EdgeAction>) {
    (EdgeState::Online, vec![EdgeAction::RewardSupernode(from)])
}

/// `edge_on_register_super_nak`: the current supernode reported failure;
/// penalize it (which rotates the list via resort) and fall back to
/// re-registering with whichever candidate is now best.
pub fn edge_on_register_super_nak(_state: EdgeState) -> (EdgeState, Vec<EdgeAction>) {
    (EdgeState::SupernodeRegistering, vec![EdgeAction::PenalizeCurrentSupernode])
}

/// `edge_on_register_ttl_elapsed`: the periodic timer fired; always demand a
/// fresh REGISTER_SUPER regardless of the state we were in.
pub fn edge_on_register_ttl_elapsed(state: EdgeState) -> EdgeState {
    match state {
        EdgeState::Online => EdgeState::ReRegistering,
        other => other,
    }
}

/// `peer_on_register_sent`: the edge itself initiates hole-punching toward a
/// newly learned peer.
pub fn peer_on_register_sent(state: PeerState) -> PeerState {
    match state {
        PeerState::Unknown => PeerState::Registering,
        other => other,
    }
}

/// `peer_on_register_received`: a REGISTER arrived from the peer itself
/// (not relayed). The first exchange makes it a p2p candidate; a second
/// exchange confirms the NAT hole is open both ways.
pub fn peer_on_register_received(state: PeerState) -> PeerState {
    match state {
        PeerState::Unknown | PeerState::Registering | PeerState::Registered => PeerState::P2pCandidate,
        PeerState::P2pCandidate => PeerState::P2pConfirmed,
        PeerState::P2pConfirmed => PeerState::P2pConfirmed,
    }
}

/// `peer_on_register_ack_received`: the supernode-relayed REGISTER/ACK
/// round-trip completed.
pub fn peer_on_register_ack_received(state: PeerState) -> PeerState {
    match state {
        PeerState::Unknown | PeerState::Registering => PeerState::Registered,
        other => other,
    }
}

/// `decide_tap_forward`: implements `spec.md` §4.8's TAP → network rules.
pub fn decide_tap_forward(
    dst_mac: Mac,
    peer: Option<(&PeerState, N2nSock)>,
    registered_peers: &[N2nSock],
    current_supernode: Option<N2nSock>,
    allow_p2p: bool,
    allow_routing: bool,
    drop_multicast: bool,
) -> ForwardDecision {
    if let Some((PeerState::P2pConfirmed, sock)) = peer {
        if allow_p2p {
            return ForwardDecision::DirectToPeer(sock);
        }
    }

    if dst_mac.is_multi_broadcast() {
        if drop_multicast && dst_mac.is_multicast() {
            return ForwardDecision::Drop;
        }
        return ForwardDecision::FloodToRegisteredPeers(registered_peers.to_vec());
    }

    if allow_routing {
        if let Some(sn) = current_supernode {
            return ForwardDecision::ViaSupernode(sn);
        }
    }

    ForwardDecision::Drop
}

/// `should_accept_network_frame`: implements the Network → TAP half of the
/// forwarding rules.
pub fn should_accept_network_frame(dst_mac: Mac, tap_mac: Mac) -> bool {
    dst_mac == tap_mac || dst_mac.is_multi_broadcast()
}

/// Bind the management plane's optional Unix-domain listener, if configured
/// and supported on this target. A no-op stub on targets without the
/// `mgmt-unix-socket` feature keeps the call site unconditional.
#[cfg(all(unix, feature = "mgmt-unix-socket"))]
fn bind_mgmt_unix_socket(mgmt: &mut SlotPool, poll: &Poll, config: &EdgeConfig) {
    let Some(unix_sock) = &config.mgmt_unix_socket else {
        return;
    };
    if let Err(err) = mgmt.listen_unix(poll, &unix_sock.path) {
        warn!("[edge] management unix listener failed to bind on {:?}: {err}", unix_sock.path);
    } else {
        apply_unix_socket_permissions(unix_sock);
    }
}

#[cfg(not(all(unix, feature = "mgmt-unix-socket")))]
fn bind_mgmt_unix_socket(_mgmt: &mut SlotPool, _poll: &Poll, _config: &EdgeConfig) {}

/// Apply the configured mode/uid/gid to a freshly bound management Unix
/// socket. Best-effort, matching `listen_unix`'s own "ignore chmod/chown
/// failures" stance: a socket that can't be rechowned is still usable by
/// whatever already has access to the containing directory.
#[cfg(all(unix, feature = "mgmt-unix-socket"))]
fn apply_unix_socket_permissions(unix_sock: &crate::config::MgmtUnixSocket) {
    use std::os::unix::ffi::OsStrExt;
    let Ok(path_c) = std::ffi::CString::new(unix_sock.path.as_os_str().as_bytes()) else {
        return;
    };
    unsafe {
        libc::chmod(path_c.as_ptr(), unix_sock.mode as libc::mode_t);
        if unix_sock.uid.is_some() || unix_sock.gid.is_some() {
            let uid = unix_sock.uid.map_or(u32::MAX, |v| v) as libc::uid_t;
            let gid = unix_sock.gid.map_or(u32::MAX, |v| v) as libc::gid_t;
            libc::chown(path_c.as_ptr(), uid, gid);
        }
    }
}

/// Ties the peer table, supernode list, resolver, slot pool, TAP, and UDP
/// socket together behind one `mio::Poll`. Construction and teardown mirror
/// `edge_verify_conf` → `tuntap_open` → `edge_init` / `edge_term` →
/// `tuntap_close`; `Drop` plays the role of the latter pair.
pub struct EdgeRuntime<T: Tap, X: Transform, R: SecureRandom> {
    config: EdgeConfig,
    tap: T,
    transform: X,
    rand: R,
    udp: UdpSocket,
    poll: Poll,
    events: Events,
    peers: PeerTable,
    supernodes: SupernodeList,
    timestamps: TimeStampGenerator,
    mgmt: SlotPool,
    metrics: EdgeMetrics,
    resolver: Option<Resolver>,
    state: EdgeState,
    keep_running: bool,
    last_register_tick: Instant,
    last_ack_at: Option<Instant>,
    last_supernode_ack_timestamp: u64,
    recv_buf: Vec<u8>,
    tap_buf: Vec<u8>,
}

impl<T: Tap, X: Transform> EdgeRuntime<T, X, crate::rand::InsecureRandom> {
    /// Build a runtime with the crate's default (non-cryptographic) RNG --
    /// convenient for tests and examples; production callers should prefer
    /// [`Self::with_rand`] with a real CSPRNG.
    pub fn new(config: EdgeConfig, tap: T, transform: X) -> Result<Self, EdgeError> {
        Self::with_rand(config, tap, transform, crate::rand::InsecureRandom::new(0x5EED))
    }
}

impl<T: Tap, X: Transform, R: SecureRandom> EdgeRuntime<T, X, R> {
    pub fn with_rand(config: EdgeConfig, tap: T, transform: X, rand: R) -> Result<Self, EdgeError> {
        config.validate()?;

        let bind_addr = std::net::SocketAddr::new(config.bind_address, config.bind_port);
        let mut udp = UdpSocket::bind(bind_addr).map_err(EdgeError::BindFailed)?;

        let poll = Poll::new()?;
        poll.registry().register(&mut udp, UDP_TOKEN, Interest::READABLE)?;

        let tap_fd: RawFd = tap.as_raw_fd_like();
        if tap_fd >= 0 {
            poll.registry()
                .register(&mut SourceFd(&tap_fd), TAP_TOKEN, Interest::READABLE)?;
        }

        const MGMT_SLOTS: usize = 8;
        let mut mgmt = SlotPool::new(MGMT_SLOTS, 8192, 4096);
        let mgmt_addr =
            std::net::SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), config.community.mgmt_port);
        if let Err(err) = mgmt.listen_tcp(&poll, mgmt_addr) {
            warn!("[edge] management listener failed to bind on {mgmt_addr}: {err}");
        }

        bind_mgmt_unix_socket(&mut mgmt, &poll, &config);

        let mut supernodes = SupernodeList::new();
        let mut unresolved_hostnames = Vec::new();
        for sn in &config.supernodes {
            if let Ok(ip) = sn.host.parse::<std::net::Ipv4Addr>() {
                supernodes.push(Supernode::new(N2nSock::v4(ip, sn.port), Some(sn.host.clone())));
            } else {
                supernodes.push(Supernode::new(N2nSock::INVALID, Some(sn.host.clone())));
                unresolved_hostnames.push((sn.host.clone(), sn.port));
            }
        }

        let resolver = if unresolved_hostnames.is_empty() {
            None
        } else {
            Some(Resolver::start(unresolved_hostnames, Arc::new(SystemResolve) as Arc<dyn Resolve>))
        };

        Ok(Self {
            config,
            tap,
            transform,
            rand,
            udp,
            poll,
            events: Events::with_capacity(128),
            peers: PeerTable::new(),
            supernodes,
            timestamps: TimeStampGenerator::new(),
            mgmt,
            metrics: EdgeMetrics::new(),
            resolver,
            state: EdgeState::Boot,
            keep_running: true,
            last_register_tick: Instant::now(),
            last_ack_at: None,
            last_supernode_ack_timestamp: 0,
            recv_buf: vec![0u8; 2048],
            tap_buf: vec![0u8; 2048],
        })
    }

    /// Expose the running counters for an embedder that wants them without
    /// going through the management HTTP surface.
    pub fn metrics(&self) -> &EdgeMetrics {
        &self.metrics
    }

    pub fn state(&self) -> EdgeState {
        self.state
    }

    pub fn stop(&mut self) {
        self.keep_running = false;
    }

    /// Run reactor iterations until [`Self::stop`] is called.
    pub fn run(&mut self) -> Result<(), EdgeError> {
        while self.keep_running {
            self.run_once()?;
        }
        Ok(())
    }

    /// One readiness wait plus whatever it wakes up -- isolated so tests can
    /// step the reactor deterministically.
    pub fn run_once(&mut self) -> Result<(), EdgeError> {
        self.poll.poll(&mut self.events, Some(Duration::from_millis(200)))?;

        let ready: Vec<(Token, bool, bool)> =
            self.events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect();
        for (token, readable, writable) in ready {
            match token {
                TAP_TOKEN => self.drain_tap()?,
                UDP_TOKEN => self.drain_udp()?,
                t if t.0 < MGMT_TOKEN_CEILING => self.drive_mgmt(t, readable, writable)?,
                other => trace!("[edge] unhandled reactor token {other:?}"),
            }
        }

        self.run_timers();
        self.metrics.slot_timeouts += self.mgmt.reap_idle(&self.poll, Instant::now())? as u64;
        Ok(())
    }

    fn drive_mgmt(&mut self, token: Token, readable: bool, writable: bool) -> Result<(), EdgeError> {
        if self.mgmt.is_listener_token(token) {
            self.mgmt.accept_ready(&self.poll, token)?;
            return Ok(());
        }
        let Some(idx) = self.mgmt.slot_index(token) else {
            return Ok(());
        };
        if readable {
            self.mgmt.on_readable(&self.poll, idx)?;
            if self.mgmt.slot(idx).state() == SlotState::Ready {
                self.service_mgmt_request(idx);
            }
        }
        if writable {
            self.mgmt.on_writable(&self.poll, idx)?;
        }
        Ok(())
    }

    /// Route a fully-buffered management request to a handler and stage its
    /// reply, the text-protocol analogue of `AdminApi`'s command dispatch.
    fn service_mgmt_request(&mut self, idx: usize) {
        let route = request::parse_route(self.mgmt.slot(idx).request_bytes());
        let (header, body): (Vec<u8>, Vec<u8>) = match route {
            Route::Metrics => {
                let body = self.metrics.to_json().into_bytes();
                (request::ok_header(body.len()), body)
            }
            Route::Health => {
                let body = format!(r#"{{"state":"{:?}","peers":{}}}"#, self.state, self.peers.len()).into_bytes();
                (request::ok_header(body.len()), body)
            }
            Route::NotFound => (request::not_found_header(), Vec::new()),
        };
        if self.mgmt.slot_mut(idx).stage_reply(&header, body).is_err() {
            self.mgmt.slot_mut(idx).close();
        }
    }

    fn drain_tap(&mut self) -> Result<(), EdgeError> {
        loop {
            let n = match self.tap.read_frame(&mut self.tap_buf) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            let frame = self.tap_buf[..n].to_vec();
            self.forward_tap_frame(&frame)?;
        }
    }

    fn forward_tap_frame(&mut self, frame: &[u8]) -> Result<(), EdgeError> {
        if frame.len() < 2 * crate::mac::MAC_SIZE {
            return Ok(());
        }
        let dst_mac = Mac::from_bytes(frame[0..6].try_into().unwrap());
        let src_mac = self.tap.mac();

        let registered: Vec<N2nSock> =
            self.peers.iter().filter(|p| p.state != PeerState::Unknown).map(|p| p.sock).collect();
        let peer_lookup = self.peers.get_by_mac(&dst_mac).map(|p| (&p.state, p.sock));
        let current_supernode = self.supernodes.current().map(|s| s.sock);

        let decision = decide_tap_forward(
            dst_mac,
            peer_lookup,
            &registered,
            current_supernode,
            self.config.community.allow_p2p,
            self.config.community.allow_routing,
            self.config.community.drop_multicast,
        );

        match decision {
            ForwardDecision::Drop => Ok(()),
            ForwardDecision::DirectToPeer(sock) => self.send_packet(sock, src_mac, dst_mac, frame),
            ForwardDecision::ViaSupernode(sock) => self.send_packet(sock, src_mac, dst_mac, frame),
            ForwardDecision::FloodToRegisteredPeers(socks) => {
                for sock in socks {
                    self.send_packet(sock, src_mac, dst_mac, frame)?;
                }
                Ok(())
            }
        }
    }

    fn send_packet(&mut self, to: N2nSock, src_mac: Mac, dst_mac: Mac, plaintext: &[u8]) -> Result<(), EdgeError> {
        let mut ciphertext = Vec::with_capacity(plaintext.len() + self.transform.header_len());
        self.transform.encode(&(), plaintext, &mut ciphertext)?;

        let mut out = Vec::with_capacity(ciphertext.len() + 64);
        let msg = N2nMessage::Packet {
            src_mac,
            dst_mac,
            transform_id: self.transform.id().0,
            payload: &ciphertext,
        };
        codec::encode(&mut out, self.config.community.name.as_bytes(), self.config.community.register_ttl, &msg);

        let addr: std::net::SocketAddr =
            to.try_into().map_err(|_| EdgeError::DecodeError("packet destined to invalid socket"))?;
        self.udp.send_to(&out, addr)?;
        self.metrics.packets_forwarded += 1;
        self.metrics.bytes_sent += out.len() as u64;
        Ok(())
    }

    fn drain_udp(&mut self) -> Result<(), EdgeError> {
        loop {
            let (n, from) = match self.udp.recv_from(&mut self.recv_buf) {
                Ok(pair) => pair,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            let from_sock = N2nSock::from(from);
            self.metrics.bytes_received += n as u64;
            let bytes = self.recv_buf[..n].to_vec();
            if let Err(err) = self.handle_datagram(from_sock, &bytes) {
                match err {
                    EdgeError::DecodeError(_) => self.metrics.decode_errors += 1,
                    EdgeError::CryptoFailed(_) => self.metrics.crypto_failures += 1,
                    EdgeError::ReplayRejected => self.metrics.replay_rejected += 1,
                    _ => {}
                }
                debug!("[edge] dropping malformed datagram from {from_sock}: {err}");
            }
        }
    }

    fn handle_datagram(&mut self, from: N2nSock, bytes: &[u8]) -> Result<(), EdgeError> {
        let decoded = codec::decode(bytes, self.config.community.name.as_bytes())?;
        let actions = self.dispatch(from, decoded.message)?;
        self.apply_actions(actions)
    }

    fn dispatch(&mut self, from: N2nSock, message: N2nMessage<'_>) -> Result<Vec<EdgeAction>, EdgeError> {
        match message {
            N2nMessage::RegisterSuperAck { src_mac, timestamp } => {
                let mut previous = self.last_supernode_ack_timestamp;
                if !self.timestamps.verify_and_update(timestamp, Some(&mut previous), true) {
                    return Err(EdgeError::ReplayRejected);
                }
                self.last_supernode_ack_timestamp = previous;
                self.last_ack_at = Some(Instant::now());
                self.peers.add_or_update(from, src_mac, OnMiss::Insert);
                let (next, actions) = edge_on_register_super_ack(self.state, from);
                self.state = next;
                Ok(actions)
            }
            N2nMessage::RegisterSuperNak { .. } => {
                let (next, actions) = edge_on_register_super_nak(self.state);
                self.state = next;
                Ok(actions)
            }
            N2nMessage::Register { src_mac, dst_mac: _, timestamp: _ } => {
                let known_before = self.peers.get_by_sock(&from).is_some();
                self.peers.add_or_update(from, src_mac, OnMiss::Insert);
                let current = self.peers.get_by_mac(&src_mac).map_or(PeerState::Unknown, |p| p.state);
                let next = if known_before {
                    peer_on_register_received(current)
                } else {
                    PeerState::P2pCandidate
                };
                Ok(vec![
                    EdgeAction::UpsertPeerState { mac: src_mac, state: next },
                    EdgeAction::SendControl {
                        to: from,
                        message: ControlMessage::RegisterAck { src_mac: self.tap.mac(), dst_mac: src_mac },
                    },
                ])
            }
            N2nMessage::RegisterAck { src_mac, .. } => {
                let current = self.peers.get_by_mac(&src_mac).map_or(PeerState::Unknown, |p| p.state);
                Ok(vec![EdgeAction::UpsertPeerState {
                    mac: src_mac,
                    state: peer_on_register_ack_received(current),
                }])
            }
            N2nMessage::Deregister { src_mac } => Ok(vec![EdgeAction::RemovePeer(src_mac)]),
            N2nMessage::Packet { src_mac: _, dst_mac, transform_id: _, payload } => {
                if should_accept_network_frame(dst_mac, self.tap.mac()) {
                    let mut plaintext = Vec::with_capacity(payload.len());
                    self.transform.decode(&(), payload, &mut plaintext)?;
                    Ok(vec![EdgeAction::WriteTap(plaintext)])
                } else {
                    Ok(vec![])
                }
            }
            N2nMessage::Federation { .. } => Ok(vec![]),
            N2nMessage::RegisterSuper { .. } => Ok(vec![]),
        }
    }

    fn apply_actions(&mut self, actions: Vec<EdgeAction>) -> Result<(), EdgeError> {
        for action in actions {
            match action {
                EdgeAction::SendControl { to, message } => {
                    let mut out = Vec::with_capacity(64);
                    codec::encode(
                        &mut out,
                        self.config.community.name.as_bytes(),
                        self.config.community.register_ttl,
                        &message.as_wire(),
                    );
                    if let Ok(addr) = std::net::SocketAddr::try_from(to) {
                        self.udp.send_to(&out, addr)?;
                    }
                }
                EdgeAction::SendPacket { to, src_mac, dst_mac, transform_id: _, payload } => {
                    self.send_packet(to, src_mac, dst_mac, &payload)?;
                }
                EdgeAction::WriteTap(frame) => {
                    self.tap.write_frame(&frame)?;
                }
                EdgeAction::PenalizeCurrentSupernode => {
                    self.supernodes.penalize_current(SELECTION_CRITERION_TIMEOUT_PENALTY);
                }
                EdgeAction::RewardSupernode(sock) => {
                    self.supernodes.reward(&sock);
                }
                EdgeAction::UpsertPeerState { mac, state } => {
                    if let Some(peer) = self.peers.get_by_mac(&mac) {
                        let sock = peer.sock;
                        if let Some(entry) = self.peers.add_or_update(sock, mac, OnMiss::Skip) {
                            entry.state = state;
                        }
                    }
                }
                EdgeAction::RemovePeer(mac) => {
                    self.peers.remove_by_mac(&mac);
                }
            }
        }
        Ok(())
    }

    fn run_timers(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_register_tick) < self.config.community.register_interval {
            return;
        }
        self.last_register_tick = now;

        if let Some(last_ack) = self.last_ack_at {
            if now.duration_since(last_ack) > Duration::from_secs(u64::from(self.config.community.register_ttl)) {
                self.state = edge_on_register_ttl_elapsed(self.state);
            }
        }

        if let Some(sn) = self.supernodes.current() {
            let timestamp = self.timestamps.time_stamp();
            let message = ControlMessage::RegisterSuper { src_mac: self.tap.mac(), timestamp };
            let mut out = Vec::with_capacity(64);
            codec::encode(&mut out, self.config.community.name.as_bytes(), self.config.community.register_ttl, &message.as_wire());
            if let Ok(addr) = std::net::SocketAddr::try_from(sn.sock) {
                let _ = self.udp.send_to(&out, addr);
            }
            if self.state == EdgeState::Boot {
                self.state = EdgeState::SupernodeRegistering;
            }
        } else {
            warn!("[edge] no supernode configured; cannot register");
        }

        self.send_peer_registers();
        self.poll_resolver(now);

        let stale_threshold =
            self.config.community.register_interval.as_secs().saturating_mul(3);
        let stale: Vec<Mac> = self
            .peers
            .iter()
            .filter(|p| p.last_seen_secs > 0 && now.elapsed().as_secs().saturating_sub(p.last_seen_secs) > stale_threshold)
            .map(|p| p.mac_addr)
            .collect();
        for mac in stale {
            self.peers.remove_by_mac(&mac);
        }
    }

    /// Emit REGISTER to every known peer not yet p2p-confirmed, per
    /// `spec.md` §4.8's NAT hole-punching requirement: a direct UDP
    /// exchange with the peer itself, independent of the supernode
    /// rendezvous, so each side's NAT learns the other's mapping.
    fn send_peer_registers(&mut self) {
        let src_mac = self.tap.mac();
        let targets: Vec<(N2nSock, Mac, PeerState)> = self
            .peers
            .iter()
            .filter(|p| p.state != PeerState::P2pConfirmed)
            .map(|p| (p.sock, p.mac_addr, p.state))
            .collect();

        for (sock, dst_mac, state) in targets {
            let timestamp = self.timestamps.time_stamp();
            let message = ControlMessage::Register { src_mac, dst_mac, timestamp };
            let mut out = Vec::with_capacity(64);
            codec::encode(&mut out, self.config.community.name.as_bytes(), self.config.community.register_ttl, &message.as_wire());
            if let Ok(addr) = std::net::SocketAddr::try_from(sock) {
                let _ = self.udp.send_to(&out, addr);
            }
            let next = peer_on_register_sent(state);
            if next != state {
                if let Some(entry) = self.peers.add_or_update(sock, dst_mac, OnMiss::Skip) {
                    entry.state = next;
                }
            }
        }
    }

    /// Non-blocking handshake with the background [`Resolver`], applying
    /// any freshly resolved supernode address to the supernode list.
    fn poll_resolver(&mut self, now: Instant) {
        let Some(resolver) = self.resolver.as_mut() else {
            return;
        };
        let supernodes = &mut self.supernodes;
        resolver.check(now, false, |host, sock| {
            supernodes.update_sock_by_hostname(host, sock);
        });
    }
}

/// A transform with no real cryptography, used when a community is
/// configured without an `encrypt_key`.
pub type DefaultTransform = NullTransform;

impl<T: Tap, X: Transform, R: SecureRandom> Drop for EdgeRuntime<T, X, R> {
    /// The UDP socket, management listeners, and slots all close themselves
    /// via their own `Drop` impls as this struct's fields are torn down;
    /// this exists to mark the point of explicit shutdown and log it.
    fn drop(&mut self) {
        debug!("[edge] runtime shutting down in state {:?}", self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sock(port: u16) -> N2nSock {
        N2nSock::v4(Ipv4Addr::new(10, 0, 0, 1), port)
    }

    #[test]
    fn register_super_ack_brings_edge_online_and_rewards_supernode() {
        let (state, actions) = edge_on_register_super_ack(EdgeState::SupernodeRegistering, sock(1));
        assert_eq!(state, EdgeState::Online);
        assert!(matches!(actions.as_slice(), [EdgeAction::RewardSupernode(s)] if *s == sock(1)));
    }

    #[test]
    fn register_super_nak_demotes_to_registering_and_penalizes() {
        let (state, actions) = edge_on_register_super_nak(EdgeState::Online);
        assert_eq!(state, EdgeState::SupernodeRegistering);
        assert!(matches!(actions.as_slice(), [EdgeAction::PenalizeCurrentSupernode]));
    }

    #[test]
    fn register_ttl_elapsed_only_demotes_from_online() {
        assert_eq!(edge_on_register_ttl_elapsed(EdgeState::Online), EdgeState::ReRegistering);
        assert_eq!(edge_on_register_ttl_elapsed(EdgeState::Boot), EdgeState::Boot);
    }

    #[test]
    fn two_register_round_trips_confirm_p2p() {
        let first = peer_on_register_received(PeerState::Unknown);
        assert_eq!(first, PeerState::P2pCandidate);
        let second = peer_on_register_received(first);
        assert_eq!(second, PeerState::P2pConfirmed);
    }

    #[test]
    fn register_ack_moves_registering_peer_to_registered() {
        assert_eq!(peer_on_register_ack_received(PeerState::Registering), PeerState::Registered);
        assert_eq!(peer_on_register_ack_received(PeerState::P2pConfirmed), PeerState::P2pConfirmed);
    }

    #[test]
    fn tap_forward_prefers_direct_p2p_when_confirmed_and_allowed() {
        let peer_state = PeerState::P2pConfirmed;
        let decision = decide_tap_forward(
            Mac::parse("AA:AA:AA:AA:AA:AA").unwrap(),
            Some((&peer_state, sock(5))),
            &[],
            Some(sock(1)),
            true,
            true,
            false,
        );
        assert_eq!(decision, ForwardDecision::DirectToPeer(sock(5)));
    }

    #[test]
    fn tap_forward_floods_broadcast_unless_multicast_dropped() {
        let decision = decide_tap_forward(Mac::BROADCAST, None, &[sock(1), sock(2)], None, true, true, false);
        assert_eq!(decision, ForwardDecision::FloodToRegisteredPeers(vec![sock(1), sock(2)]));

        let multicast = Mac::from_bytes([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
        let dropped = decide_tap_forward(multicast, None, &[sock(1)], None, true, true, true);
        assert_eq!(dropped, ForwardDecision::Drop);
    }

    #[test]
    fn tap_forward_routes_via_supernode_when_allowed() {
        let decision = decide_tap_forward(
            Mac::parse("BB:BB:BB:BB:BB:BB").unwrap(),
            None,
            &[],
            Some(sock(9)),
            true,
            true,
            false,
        );
        assert_eq!(decision, ForwardDecision::ViaSupernode(sock(9)));
    }

    #[test]
    fn tap_forward_drops_when_routing_disallowed_and_no_peer() {
        let decision =
            decide_tap_forward(Mac::parse("CC:CC:CC:CC:CC:CC").unwrap(), None, &[], Some(sock(9)), true, false, false);
        assert_eq!(decision, ForwardDecision::Drop);
    }

    #[test]
    fn network_frame_accepted_for_own_mac_or_broadcast() {
        let mac = Mac::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert!(should_accept_network_frame(mac, mac));
        assert!(should_accept_network_frame(Mac::BROADCAST, mac));
        assert!(!should_accept_network_frame(Mac::parse("11:22:33:44:55:66").unwrap(), mac));
    }
}
