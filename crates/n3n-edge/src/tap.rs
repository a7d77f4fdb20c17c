// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The TAP device boundary.
//!
//! Opening and configuring a TAP/TUN interface is platform-specific system
//! programming out of scope for this crate; what's defined here is the
//! handle shape the reactor registers with `mio` and reads/writes frames
//! through.

use std::io;
use std::os::unix::io::RawFd;

use crate::mac::Mac;

/// Address-assignment mode for a TAP interface.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AddressMode {
    Static,
    Dhcp,
    SupernodeAssigned,
}

/// An open TAP device. Implementations own the underlying file descriptor
/// and are responsible for closing it on drop.
pub trait Tap {
    /// Read one Ethernet frame into `buf`, returning its length. Mirrors a
    /// non-blocking `read(2)` on the TAP fd.
    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one Ethernet frame out to the TAP device.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// The interface's own MAC address, as reported at open time.
    fn mac(&self) -> Mac;

    /// The raw fd, for `mio` registration. Unix-only: there is no Windows
    /// TAP path exercised by this crate's scope either.
    fn as_raw_fd_like(&self) -> RawFd;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory TAP stand-in for reactor/edge tests: frames written to
    /// it are queued for `read_frame` to hand back, so a test can drive a
    /// "loopback" TAP without any platform dependency.
    pub struct LoopbackTap {
        mac: Mac,
        inbound: VecDeque<Vec<u8>>,
        pub written: Vec<Vec<u8>>,
    }

    impl LoopbackTap {
        pub fn new(mac: Mac) -> Self {
            Self {
                mac,
                inbound: VecDeque::new(),
                written: Vec::new(),
            }
        }

        pub fn push_inbound(&mut self, frame: Vec<u8>) {
            self.inbound.push_back(frame);
        }
    }

    impl Tap for LoopbackTap {
        fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inbound.pop_front() {
                Some(frame) => {
                    let n = frame.len().min(buf.len());
                    buf[..n].copy_from_slice(&frame[..n]);
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no frame queued")),
            }
        }

        fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            self.written.push(frame.to_vec());
            Ok(())
        }

        fn mac(&self) -> Mac {
            self.mac
        }

        fn as_raw_fd_like(&self) -> RawFd {
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::LoopbackTap;
    use super::*;

    #[test]
    fn loopback_tap_round_trips_frames() {
        let mut tap = LoopbackTap::new(Mac::parse("02:00:00:00:00:01").unwrap());
        tap.push_inbound(b"ethernet frame".to_vec());

        let mut buf = [0u8; 64];
        let n = tap.read_frame(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ethernet frame");

        tap.write_frame(b"outbound frame").unwrap();
        assert_eq!(tap.written, vec![b"outbound frame".to_vec()]);
    }

    #[test]
    fn empty_loopback_tap_would_block() {
        let mut tap = LoopbackTap::new(Mac::NULL);
        let mut buf = [0u8; 16];
        let err = tap.read_frame(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
