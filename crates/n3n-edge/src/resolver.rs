// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background hostname resolver for supernodes that were configured by
//! name rather than address.
//!
//! A worker thread owns the blocking DNS lookups; the reactor thread only
//! ever does a non-blocking `try_lock` so a slow or hung resolver never
//! stalls packet forwarding. Cancellation is cooperative: `stop()` flips an
//! `AtomicBool` and joins the worker, so a resolve sweep in progress always
//! finishes cleanly instead of being torn down mid-iteration.

use std::io;
use std::net::{Ipv4Addr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::sock::N2nSock;

/// Base period for a full resolve sweep.
pub const RESOLVE_INTERVAL: Duration = Duration::from_secs(300);
/// Wake interval between sweeps, so a signaled request is noticed promptly.
pub const RESOLVE_WAKE_INTERVAL: Duration = Duration::from_secs(RESOLVE_INTERVAL.as_secs() / 60);
/// Shortened sweep period while any entry is failing to resolve.
pub const RESOLVE_INTERVAL_ON_ERROR: Duration = Duration::from_secs(RESOLVE_INTERVAL.as_secs() / 10);
/// Reactor-side gate on how often it bothers to even try the lock.
pub const RESOLVE_CHECK_INTERVAL: Duration = RESOLVE_INTERVAL_ON_ERROR;

/// Abstracts hostname-to-address lookup so the worker is testable without
/// touching the network.
pub trait Resolve: Send + Sync {
    fn resolve_ipv4(&self, host: &str) -> io::Result<Ipv4Addr>;
}

/// The real resolver, backed by the system's getaddrinfo via `ToSocketAddrs`.
#[derive(Debug, Default)]
pub struct SystemResolve;

impl Resolve for SystemResolve {
    fn resolve_ipv4(&self, host: &str) -> io::Result<Ipv4Addr> {
        (host, 0u16)
            .to_socket_addrs()?
            .find_map(|addr| match addr.ip() {
                std::net::IpAddr::V4(v4) => Some(v4),
                std::net::IpAddr::V6(_) => None,
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no IPv4 address found"))
    }
}

struct Entry {
    hostname: String,
    port: u16,
    live_sock: N2nSock,
    shadow_sock: N2nSock,
    error: bool,
}

struct Shared {
    entries: Vec<Entry>,
    changed: bool,
    request: bool,
    last_resolved: Instant,
}

/// Owns the resolver worker thread and the shared state it updates.
pub struct Resolver {
    shared: Arc<Mutex<Shared>>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    last_checked: Instant,
    check_interval: Duration,
}

impl Resolver {
    /// Start the worker, seeded with the (hostname, port) pairs of every
    /// supernode that was configured by name.
    pub fn start(hostnames: Vec<(String, u16)>, resolve: Arc<dyn Resolve>) -> Self {
        let now = Instant::now();
        let entries = hostnames
            .into_iter()
            .map(|(hostname, port)| Entry {
                hostname,
                port,
                live_sock: N2nSock::INVALID,
                shadow_sock: N2nSock::INVALID,
                error: false,
            })
            .collect();

        let shared = Arc::new(Mutex::new(Shared {
            entries,
            changed: false,
            request: false,
            last_resolved: now,
        }));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let worker_shared = Arc::clone(&shared);
        let worker_stop = Arc::clone(&stop_flag);
        let handle = thread::Builder::new()
            .name("n3n-resolver".to_string())
            .spawn(move || Self::run_loop(worker_shared, worker_stop, resolve))
            .expect("failed to spawn resolver thread");

        Self {
            shared,
            stop_flag,
            handle: Some(handle),
            last_checked: now,
            check_interval: RESOLVE_CHECK_INTERVAL,
        }
    }

    fn run_loop(shared: Arc<Mutex<Shared>>, stop_flag: Arc<AtomicBool>, resolve: Arc<dyn Resolve>) {
        let mut rep_time = RESOLVE_INTERVAL_ON_ERROR;
        while !stop_flag.load(Ordering::Relaxed) {
            thread::sleep(RESOLVE_WAKE_INTERVAL);
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let mut guard = shared.lock().unwrap_or_else(|poison| poison.into_inner());
            let now = Instant::now();
            if guard.request || now.duration_since(guard.last_resolved) > rep_time {
                let mut changed = false;
                for entry in &mut guard.entries {
                    match resolve.resolve_ipv4(&entry.hostname) {
                        Ok(ip) => {
                            let resolved = N2nSock::v4(ip, entry.port);
                            entry.error = false;
                            if resolved != entry.live_sock {
                                entry.shadow_sock = resolved;
                                changed = true;
                            }
                        }
                        Err(_) => entry.error = true,
                    }
                }
                if changed {
                    guard.changed = true;
                }
                guard.last_resolved = now;
                guard.request = false;
                rep_time = if guard.entries.iter().any(|e| e.error) {
                    RESOLVE_INTERVAL_ON_ERROR
                } else {
                    RESOLVE_INTERVAL
                };
            }
        }
    }

    /// Non-blocking reactor-side handshake. Returns whether resolution is
    /// still outstanding (mirrors `resolve_check`'s return value).
    ///
    /// On success, any "changed" shadow sockets are copied into `live_sock`
    /// and handed back via `on_resolved` so the caller can update its
    /// supernode list.
    pub fn check(
        &mut self,
        now: Instant,
        requires_resolution: bool,
        mut on_resolved: impl FnMut(&str, N2nSock),
    ) -> bool {
        let mut still_requires = requires_resolution;

        if now.duration_since(self.last_checked) <= self.check_interval && !requires_resolution {
            return still_requires;
        }

        if let Ok(mut guard) = self.shared.try_lock() {
            if guard.changed {
                guard.changed = false;
                for entry in &mut guard.entries {
                    entry.live_sock = entry.shadow_sock;
                    on_resolved(&entry.hostname, entry.live_sock);
                }
            }

            if requires_resolution {
                guard.request = true;
                still_requires = false;
            }

            self.last_checked = now;
            self.check_interval = if guard.request {
                RESOLVE_CHECK_INTERVAL / 10
            } else {
                RESOLVE_CHECK_INTERVAL
            };
        }

        still_requires
    }

    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
