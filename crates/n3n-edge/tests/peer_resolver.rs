// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exercises the resolver's background-thread handshake against a real
//! [`SupernodeList`], and a peer table transition driven off the result.

use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use n3n_edge::mac::Mac;
use n3n_edge::peer::{OnMiss, PeerState, PeerTable};
use n3n_edge::resolver::{Resolve, Resolver};
use n3n_edge::sock::N2nSock;
use n3n_edge::supernode::{Supernode, SupernodeList};

/// Resolves every hostname to a fixed, caller-controlled address, bumping a
/// counter each time it's asked so the test can assert the worker actually
/// ran rather than the check() call alone reporting success.
struct FixedResolve {
    addr: Ipv4Addr,
    calls: Arc<AtomicU32>,
}

impl Resolve for FixedResolve {
    fn resolve_ipv4(&self, _host: &str) -> io::Result<Ipv4Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.addr)
    }
}

#[test]
fn resolver_updates_supernode_list_and_unblocks_registration() {
    let calls = Arc::new(AtomicU32::new(0));
    let resolve = Arc::new(FixedResolve {
        addr: Ipv4Addr::new(203, 0, 113, 9),
        calls: Arc::clone(&calls),
    }) as Arc<dyn Resolve>;

    let mut supernodes = SupernodeList::new();
    supernodes.push(Supernode::new(N2nSock::INVALID, Some("sn.example.com".to_string())));
    assert_eq!(supernodes.current().unwrap().sock, N2nSock::INVALID);

    let mut resolver = Resolver::start(vec![("sn.example.com".to_string(), 7654)], resolve);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut resolved_sock = None;
    while Instant::now() < deadline {
        resolver.check(Instant::now(), true, |host, sock| {
            if host == "sn.example.com" {
                resolved_sock = Some(sock);
            }
        });
        if resolved_sock.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let sock = resolved_sock.expect("resolver should have resolved the hostname within the deadline");
    assert_eq!(sock, N2nSock::v4(Ipv4Addr::new(203, 0, 113, 9), 7654));
    assert!(calls.load(Ordering::SeqCst) >= 1);

    supernodes.update_sock_by_hostname("sn.example.com", sock);
    assert_eq!(supernodes.current().unwrap().sock, sock);

    // Once the supernode has a real address, the peer table can record a
    // registration attempt against it.
    let mut peers = PeerTable::new();
    let supernode_mac = Mac::from_bytes([0x02, 0, 0, 0, 0, 1]);
    let entry = peers
        .add_or_update(sock, supernode_mac, OnMiss::Insert)
        .expect("insert should succeed on first sight of this supernode");
    assert_eq!(entry.state, PeerState::Unknown);
    entry.state = PeerState::Registering;

    assert_eq!(peers.get_by_sock(&sock).unwrap().state, PeerState::Registering);

    resolver.stop();
}
