// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Drives a real `mio::Poll` over a [`SlotPool`] with an actual TCP client,
//! exercising the listener-accept-read-reply cycle end to end rather than
//! unit-testing `Slot`/`SlotPool` in isolation.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use mio::{Events, Poll, Token};

use n3n_edge::mgmt::{request, Route, SlotPool};

fn free_loopback_addr() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

#[test]
fn client_request_is_accepted_framed_and_answered() {
    let mut poll = Poll::new().unwrap();
    let mut pool = SlotPool::new(2, 8192, 4096);

    let addr = free_loopback_addr();
    pool.listen_tcp(&poll, addr).unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    client.set_nodelay(true).unwrap();
    client.write_all(b"GET /metrics HTTP/1.0\r\n\r\n").unwrap();

    let mut events = Events::with_capacity(16);
    let mut slot_token: Option<Token> = None;

    // First wake: the listener becomes readable and hands the connection to
    // a free slot.
    poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
    for event in events.iter() {
        if pool.is_listener_token(event.token()) {
            let accepted = pool.accept_ready(&poll, event.token()).unwrap();
            slot_token = accepted.into_iter().next();
        }
    }
    let slot_token = slot_token.expect("listener should have accepted a connection");
    let slot_idx = pool.slot_index(slot_token).unwrap();

    // Second wake: the accepted slot becomes readable with the client's
    // request already in flight.
    poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
    pool.on_readable(&poll, slot_idx).unwrap();

    assert_eq!(request::parse_route(pool.slot(slot_idx).request_bytes()), Route::Metrics);

    let body = b"{\"uptime_secs\":0}".to_vec();
    let header = request::ok_header(body.len());
    pool.slot_mut(slot_idx).stage_reply(&header, body.clone()).unwrap();
    pool.on_writable(&poll, slot_idx).unwrap();

    let mut response = Vec::new();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = [0u8; 256];
    loop {
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                response.extend_from_slice(&buf[..n]);
                if response.len() >= header.len() + body.len() {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(err) => panic!("read failed: {err}"),
        }
    }

    assert!(response.starts_with(b"HTTP/1.0 200 OK"));
    assert!(response.ends_with(b"{\"uptime_secs\":0}"));
    assert_eq!(pool.nr_open(), 0, "slot should have returned to Empty after a full write");
}

#[test]
fn pool_stops_advertising_once_every_slot_is_full() {
    let mut poll = Poll::new().unwrap();
    let mut pool = SlotPool::new(1, 4096, 4096);

    let addr = free_loopback_addr();
    pool.listen_tcp(&poll, addr).unwrap();

    let _first = TcpStream::connect(addr).unwrap();
    let mut events = Events::with_capacity(16);
    poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
    for event in events.iter() {
        if pool.is_listener_token(event.token()) {
            pool.accept_ready(&poll, event.token()).unwrap();
        }
    }
    assert_eq!(pool.nr_open(), 1);

    // The single slot is now occupied; the listener should have deregistered
    // itself, so a second connection attempt is not accepted by the pool
    // even though the OS-level backlog may still complete the TCP handshake.
    let _second = TcpStream::connect(addr).unwrap();
    let mut events = Events::with_capacity(16);
    poll.poll(&mut events, Some(Duration::from_millis(300))).unwrap();
    for event in events.iter() {
        if pool.is_listener_token(event.token()) {
            panic!("listener should not be registered while the pool is full");
        }
    }
    assert_eq!(pool.nr_open(), 1);
}
