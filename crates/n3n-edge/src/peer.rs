// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The peer table: every supernode or edge this node currently knows about,
//! looked up by MAC address or by socket.
//!
//! An edge that hasn't REGISTERed yet is known only by the address it last
//! sent from, so lookup needs to work both by MAC and by socket. This keeps
//! two `HashMap`s in sync: `by_mac` is authoritative, `by_sock` is a
//! secondary index rebuilt whenever a peer's MAC changes.

use std::collections::HashMap;

use crate::mac::Mac;
use crate::sock::N2nSock;

/// Whether a miss during [`PeerTable::add_or_update`] should insert a new
/// entry or merely report that none was found.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OnMiss {
    Insert,
    Skip,
}

/// Where a peer sits in the registration/hole-punching lifecycle.
///
/// `unknown` is the initial state for an entry created from a socket with no
/// MAC yet. `registering`/`registered` track the supernode-relayed path;
/// `p2p-candidate`/`p2p-confirmed` track direct NAT-traversed exchanges,
/// reached only after `allow_p2p` REGISTERs round-trip with the peer itself.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum PeerState {
    #[default]
    Unknown,
    Registering,
    Registered,
    P2pCandidate,
    P2pConfirmed,
}

/// One entry in the peer table: a supernode or edge reachable at `sock`.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub mac_addr: Mac,
    pub sock: N2nSock,
    pub state: PeerState,
    /// Lower is preferred; the supernode list sorts on this.
    pub selection_criterion: u32,
    pub last_seen_secs: u64,
}

impl PeerInfo {
    pub fn new(mac_addr: Mac, sock: N2nSock) -> Self {
        Self {
            mac_addr,
            sock,
            state: PeerState::Unknown,
            selection_criterion: 0,
            last_seen_secs: 0,
        }
    }
}

/// Dual-indexed table of known peers.
#[derive(Default)]
pub struct PeerTable {
    by_mac: HashMap<Mac, PeerInfo>,
    sock_to_mac: HashMap<N2nSock, Mac>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            by_mac: HashMap::new(),
            sock_to_mac: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_mac.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mac.is_empty()
    }

    pub fn get_by_mac(&self, mac: &Mac) -> Option<&PeerInfo> {
        self.by_mac.get(mac)
    }

    pub fn get_by_sock(&self, sock: &N2nSock) -> Option<&PeerInfo> {
        self.sock_to_mac.get(sock).and_then(|mac| self.by_mac.get(mac))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerInfo> {
        self.by_mac.values()
    }

    fn reindex_sock(&mut self, mac: Mac, sock: N2nSock) {
        self.sock_to_mac.retain(|_, m| *m != mac);
        self.sock_to_mac.insert(sock, mac);
    }

    /// Find (and possibly insert) the peer for `mac`/`sock`: look up by MAC
    /// first -- returned as-is, its socket untouched -- then by socket
    /// (rekeying the entry if the socket now reports a different MAC), and
    /// only insert a fresh entry if both lookups miss and `on_miss` allows
    /// it.
    pub fn add_or_update(&mut self, sock: N2nSock, mac: Mac, on_miss: OnMiss) -> Option<&mut PeerInfo> {
        if !mac.is_null() && self.by_mac.contains_key(&mac) {
            return self.by_mac.get_mut(&mac);
        }

        if let Some(&existing_mac) = self.sock_to_mac.get(&sock) {
            if !mac.is_null() && mac != existing_mac {
                if let Some(mut entry) = self.by_mac.remove(&existing_mac) {
                    entry.mac_addr = mac;
                    self.by_mac.insert(mac, entry);
                    self.reindex_sock(mac, sock);
                    return self.by_mac.get_mut(&mac);
                }
            }
            return self.by_mac.get_mut(&existing_mac);
        }

        if on_miss == OnMiss::Insert {
            self.by_mac.insert(mac, PeerInfo::new(mac, sock));
            self.sock_to_mac.insert(sock, mac);
            return self.by_mac.get_mut(&mac);
        }

        None
    }

    pub fn remove_by_mac(&mut self, mac: &Mac) -> Option<PeerInfo> {
        let removed = self.by_mac.remove(mac)?;
        self.sock_to_mac.retain(|_, m| m != mac);
        Some(removed)
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
    fn inserts_new_peer_by_mac() {
        let mut table = PeerTable::new();
        let mac = Mac::parse("00:11:22:33:44:55").unwrap();
        let peer = table.add_or_update(sock(1), mac, OnMiss::Insert).unwrap();
        assert_eq!(peer.mac_addr, mac);
        assert_eq!(table.len(), 1);
        assert!(table.get_by_mac(&mac).is_some());
        assert!(table.get_by_sock(&sock(1)).is_some());
    }

    #[test]
    fn skip_on_miss_does_not_insert() {
        let mut table = PeerTable::new();
        let mac = Mac::parse("00:11:22:33:44:55").unwrap();
        assert!(table.add_or_update(sock(1), mac, OnMiss::Skip).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn rekeys_existing_entry_found_by_socket_when_mac_arrives() {
        let mut table = PeerTable::new();
        table.add_or_update(sock(1), Mac::NULL, OnMiss::Insert);
        assert_eq!(table.len(), 1);

        let mac = Mac::parse("AA:BB:CC:DD:EE:FF").unwrap();
        let peer = table.add_or_update(sock(1), mac, OnMiss::Insert).unwrap();
        assert_eq!(peer.mac_addr, mac);
        assert_eq!(table.len(), 1);
        assert!(table.get_by_mac(&Mac::NULL).is_none());
        assert!(table.get_by_mac(&mac).is_some());
        assert_eq!(table.get_by_sock(&sock(1)).unwrap().mac_addr, mac);
    }

    #[test]
    fn peer_found_by_mac_keeps_its_existing_socket() {
        let mut table = PeerTable::new();
        let mac = Mac::parse("00:11:22:33:44:55").unwrap();
        table.add_or_update(sock(1), mac, OnMiss::Insert);
        let peer = table.add_or_update(sock(2), mac, OnMiss::Insert).unwrap();

        // A hit by MAC is returned as-is; the socket it was last known at is
        // not overwritten by this lookup.
        assert_eq!(peer.sock, sock(1));
        assert!(table.get_by_sock(&sock(1)).is_some());
        assert!(table.get_by_sock(&sock(2)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn new_peer_starts_unknown() {
        let mac = Mac::parse("00:11:22:33:44:55").unwrap();
        assert_eq!(PeerInfo::new(mac, sock(1)).state, PeerState::Unknown);
    }

    #[test]
    fn remove_clears_both_indices() {
        let mut table = PeerTable::new();
        let mac = Mac::parse("00:11:22:33:44:55").unwrap();
        table.add_or_update(sock(1), mac, OnMiss::Insert);
        assert!(table.remove_by_mac(&mac).is_some());
        assert!(table.is_empty());
        assert!(table.get_by_sock(&sock(1)).is_none());
    }
}
