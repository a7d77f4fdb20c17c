// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The fixed-size pool of management connection slots, registered with the
//! reactor's single `mio::Poll`.
//!
//! A fixed array of slots plus up to `SLOTS_LISTEN` listening sockets, with
//! a backlog-of-one TCP listener so the OS sheds load quickly once every
//! slot is busy. Each listener is deregistered from the poll interest set
//! while the pool is full and re-registered the moment a slot frees -- an
//! explicit "stop advertising" rather than a relied-upon side effect of a
//! tiny backlog.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
#[cfg(all(unix, feature = "mgmt-unix-socket"))]
use mio::net::{UnixListener, UnixStream};
use mio::{Interest, Poll, Token};

use crate::mgmt::slot::{Slot, SlotState};

/// Maximum number of listening sockets a pool can hold: one TCP listener
/// and, under `mgmt-unix-socket`, one Unix-domain listener.
pub const SLOTS_LISTEN: usize = 2;

const LISTENER_TOKEN_BASE: usize = 0;
const SLOT_TOKEN_BASE: usize = SLOTS_LISTEN;

/// Default idle timeout for a management connection with no activity.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Either side of the management plane: plain TCP or, on Unix with the
/// feature enabled, a Unix-domain stream. A single `Slot<MgmtStream>` type
/// can therefore hold either kind of connection.
pub enum MgmtStream {
    Tcp(TcpStream),
    #[cfg(all(unix, feature = "mgmt-unix-socket"))]
    Unix(UnixStream),
}

impl Read for MgmtStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for MgmtStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(s) => s.flush(),
        }
    }
}

impl Source for MgmtStream {
    fn register(&mut self, registry: &mio::Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.register(registry, token, interests),
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &mio::Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.reregister(registry, token, interests),
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &mio::Registry) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.deregister(registry),
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(s) => s.deregister(registry),
        }
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(all(unix, feature = "mgmt-unix-socket"))]
    Unix(UnixListener),
}

impl Listener {
    fn accept(&self) -> io::Result<MgmtStream> {
        match self {
            Self::Tcp(l) => l.accept().map(|(s, _)| MgmtStream::Tcp(s)),
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(l) => l.accept().map(|(s, _)| MgmtStream::Unix(s)),
        }
    }

    fn as_source(&mut self) -> &mut dyn Source {
        match self {
            Self::Tcp(l) => l,
            #[cfg(all(unix, feature = "mgmt-unix-socket"))]
            Self::Unix(l) => l,
        }
    }
}

/// A fixed pool of [`Slot`]s served by zero or more listeners.
pub struct SlotPool {
    slots: Vec<Slot<MgmtStream>>,
    listeners: [Option<Listener>; SLOTS_LISTEN],
    listeners_registered: [bool; SLOTS_LISTEN],
    idle_timeout: Duration,
    nr_open: usize,
}

impl SlotPool {
    pub fn new(nr_slots: usize, request_max: usize, reply_header_max: usize) -> Self {
        let slots = (0..nr_slots).map(|_| Slot::new(request_max, reply_header_max)).collect();
        Self {
            slots,
            listeners: [None, None],
            listeners_registered: [false, false],
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            nr_open: 0,
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn nr_open(&self) -> usize {
        self.nr_open
    }

    pub fn nr_slots(&self) -> usize {
        self.slots.len()
    }

    fn find_empty_listen_slot(&self) -> Option<usize> {
        self.listeners.iter().position(|l| l.is_none())
    }

    /// Bind and register a loopback-or-all-interfaces TCP listener.
    pub fn listen_tcp(&mut self, poll: &Poll, addr: SocketAddr) -> io::Result<()> {
        let listen_nr = self
            .find_empty_listen_slot()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no free listen slot"))?;

        let mut listener = TcpListener::bind(addr)?;
        poll.registry()
            .register(&mut listener, Token(LISTENER_TOKEN_BASE + listen_nr), Interest::READABLE)?;
        self.listeners[listen_nr] = Some(Listener::Tcp(listener));
        self.listeners_registered[listen_nr] = true;
        Ok(())
    }

    /// Bind and register a Unix-domain listener. Best-effort: failures to
    /// apply a mode/uid/gid afterward are the caller's concern and are
    /// deliberately not surfaced as fatal here.
    #[cfg(all(unix, feature = "mgmt-unix-socket"))]
    pub fn listen_unix(&mut self, poll: &Poll, path: &std::path::Path) -> io::Result<()> {
        let listen_nr = self
            .find_empty_listen_slot()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no free listen slot"))?;

        let _ = std::fs::remove_file(path);
        let mut listener = UnixListener::bind(path)?;
        poll.registry()
            .register(&mut listener, Token(LISTENER_TOKEN_BASE + listen_nr), Interest::READABLE)?;
        self.listeners[listen_nr] = Some(Listener::Unix(listener));
        self.listeners_registered[listen_nr] = true;
        Ok(())
    }

    fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Slot::is_empty)
    }

    fn first_free_slot(&mut self) -> Option<usize> {
        self.slots.iter().position(Slot::is_empty)
    }

    /// True if `token` addresses one of the listeners.
    pub fn is_listener_token(&self, token: Token) -> bool {
        token.0 < SLOT_TOKEN_BASE
    }

    /// Accept every pending connection on the listener at `token`, handing
    /// each to a free slot, until the listener would block or the pool
    /// fills up. When the pool is full the listener is deregistered so the
    /// reactor stops waking for it; [`Self::reap_idle`] (or any slot
    /// completing) re-registers it.
    pub fn accept_ready(&mut self, poll: &Poll, token: Token) -> io::Result<Vec<Token>> {
        let listen_nr = token.0;
        let mut accepted = Vec::new();

        loop {
            if !self.has_free_slot() {
                self.deregister_listener(poll, listen_nr)?;
                break;
            }

            let stream = {
                let listener = match &self.listeners[listen_nr] {
                    Some(l) => l,
                    None => break,
                };
                match listener.accept() {
                    Ok(stream) => stream,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => return Err(err),
                }
            };

            let slot_idx = self.first_free_slot().expect("has_free_slot just checked");
            let mut stream = stream;
            let slot_token = Token(SLOT_TOKEN_BASE + slot_idx);
            poll.registry().register(&mut stream, slot_token, Interest::READABLE)?;
            self.slots[slot_idx].accept(stream);
            self.nr_open += 1;
            accepted.push(slot_token);
        }

        Ok(accepted)
    }

    fn deregister_listener(&mut self, poll: &Poll, listen_nr: usize) -> io::Result<()> {
        if self.listeners_registered[listen_nr] {
            if let Some(listener) = &mut self.listeners[listen_nr] {
                poll.registry().deregister(listener.as_source())?;
            }
            self.listeners_registered[listen_nr] = false;
        }
        Ok(())
    }

    fn reregister_listeners_if_room(&mut self, poll: &Poll) -> io::Result<()> {
        if !self.has_free_slot() {
            return Ok(());
        }
        for listen_nr in 0..SLOTS_LISTEN {
            if self.listeners[listen_nr].is_some() && !self.listeners_registered[listen_nr] {
                if let Some(listener) = &mut self.listeners[listen_nr] {
                    poll.registry()
                        .register(listener.as_source(), Token(LISTENER_TOKEN_BASE + listen_nr), Interest::READABLE)?;
                }
                self.listeners_registered[listen_nr] = true;
            }
        }
        Ok(())
    }

    /// Look up the slot index for a connection token.
    pub fn slot_index(&self, token: Token) -> Option<usize> {
        token.0.checked_sub(SLOT_TOKEN_BASE).filter(|&i| i < self.slots.len())
    }

    pub fn slot(&self, idx: usize) -> &Slot<MgmtStream> {
        &self.slots[idx]
    }

    pub fn slot_mut(&mut self, idx: usize) -> &mut Slot<MgmtStream> {
        &mut self.slots[idx]
    }

    /// Drive a readable event for `idx`, freeing and re-registering the
    /// listener if the slot closes or errors out and the pool had been full.
    pub fn on_readable(&mut self, poll: &Poll, idx: usize) -> io::Result<()> {
        self.slots[idx].read()?;
        self.reclaim_if_finished(poll, idx)
    }

    /// Drive a writable event for `idx`.
    pub fn on_writable(&mut self, poll: &Poll, idx: usize) -> io::Result<()> {
        self.slots[idx].write()?;
        self.reclaim_if_finished(poll, idx)
    }

    fn reclaim_if_finished(&mut self, poll: &Poll, idx: usize) -> io::Result<()> {
        match self.slots[idx].state() {
            SlotState::Empty | SlotState::Closed | SlotState::Error => {
                self.slots[idx].close();
                if self.nr_open > 0 {
                    self.nr_open -= 1;
                }
                self.reregister_listeners_if_room(poll)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Close every slot that has been idle longer than the pool's timeout,
    /// returning how many were reaped.
    pub fn reap_idle(&mut self, poll: &Poll, now: Instant) -> io::Result<usize> {
        let timeout = self.idle_timeout;
        let mut reaped = 0;
        for idx in 0..self.slots.len() {
            if !self.slots[idx].is_empty() && self.slots[idx].idle_for(now) > timeout {
                self.slots[idx].close();
                if self.nr_open > 0 {
                    self.nr_open -= 1;
                }
                reaped += 1;
            }
        }
        self.reregister_listeners_if_room(poll)?;
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_token_detection() {
        let pool = SlotPool::new(2, 4096, 4096);
        assert!(pool.is_listener_token(Token(0)));
        assert!(pool.is_listener_token(Token(1)));
        assert!(!pool.is_listener_token(Token(SLOT_TOKEN_BASE)));
    }

    #[test]
    fn slot_index_maps_back_from_token() {
        let pool = SlotPool::new(3, 4096, 4096);
        assert_eq!(pool.slot_index(Token(SLOT_TOKEN_BASE)), Some(0));
        assert_eq!(pool.slot_index(Token(SLOT_TOKEN_BASE + 2)), Some(2));
        assert_eq!(pool.slot_index(Token(SLOT_TOKEN_BASE + 3)), None);
    }

    #[test]
    fn nr_open_starts_at_zero() {
        let pool = SlotPool::new(2, 4096, 4096);
        assert_eq!(pool.nr_open(), 0);
        assert_eq!(pool.nr_slots(), 2);
    }
}
