// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ethernet MAC address handling.
//!
//! A [`Mac`] is a plain 6-byte identifier with no internal structure beyond
//! the distinguished null/broadcast/multicast prefixes called out in
//! RFC 908 and used throughout the forwarding logic.

use std::fmt;

/// Number of bytes in an Ethernet MAC address.
pub const MAC_SIZE: usize = 6;

const NULL_MAC: Mac = Mac([0u8; 6]);
const BROADCAST_MAC: Mac = Mac([0xff; 6]);
const IPV4_MULTICAST_PREFIX: [u8; 3] = [0x01, 0x00, 0x5e];
const IPV6_MULTICAST_PREFIX: [u8; 2] = [0x33, 0x33];

/// A 6-byte Ethernet MAC address.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Mac(pub [u8; MAC_SIZE]);

impl Mac {
    /// The all-zero MAC, used transiently before a peer has announced itself.
    pub const NULL: Mac = NULL_MAC;

    /// The all-ones broadcast MAC.
    pub const BROADCAST: Mac = BROADCAST_MAC;

    /// Build a MAC from its 6 raw bytes.
    pub const fn from_bytes(bytes: [u8; MAC_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; MAC_SIZE] {
        &self.0
    }

    /// `true` for the all-zero address.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// `true` for the broadcast address `FF:FF:FF:FF:FF:FF`.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// `true` for an IPv4 multicast MAC (`01:00:5E` prefix, high bit of the
    /// 4th byte clear) or an IPv6 multicast MAC (`33:33` prefix).
    pub fn is_multicast(&self) -> bool {
        (self.0[0..3] == IPV4_MULTICAST_PREFIX && (self.0[3] >> 7) == 0)
            || self.0[0..2] == IPV6_MULTICAST_PREFIX
    }

    /// `true` for broadcast or either multicast form -- the set of
    /// destinations that get flooded rather than unicast-routed.
    pub fn is_multi_broadcast(&self) -> bool {
        self.is_broadcast() || self.is_multicast()
    }

    /// Parse a colon-separated hex MAC string, e.g. `"DE:AD:BE:EF:01:10"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut bytes = [0u8; MAC_SIZE];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next()?;
            if part.len() != 2 {
                return None;
            }
            *byte = u8::from_str_radix(part, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let mac = Mac::parse("DE:AD:BE:EF:01:10").unwrap();
        assert_eq!(mac.as_bytes(), &[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x10]);
        assert_eq!(mac.to_string(), "DE:AD:BE:EF:01:10");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Mac::parse("not-a-mac").is_none());
        assert!(Mac::parse("DE:AD:BE:EF:01").is_none());
        assert!(Mac::parse("DE:AD:BE:EF:01:10:99").is_none());
    }

    #[test]
    fn classifies_distinguished_values() {
        assert!(Mac::NULL.is_null());
        assert!(Mac::BROADCAST.is_broadcast());
        assert!(Mac::BROADCAST.is_multi_broadcast());

        let ipv4_mcast = Mac::from_bytes([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
        assert!(ipv4_mcast.is_multicast());
        assert!(ipv4_mcast.is_multi_broadcast());

        let ipv4_not_mcast = Mac::from_bytes([0x01, 0x00, 0x5e, 0x80, 0x00, 0x01]);
        assert!(!ipv4_not_mcast.is_multicast());

        let ipv6_mcast = Mac::from_bytes([0x33, 0x33, 0, 0, 0, 1]);
        assert!(ipv6_mcast.is_multicast());

        let unicast = Mac::from_bytes([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert!(!unicast.is_multi_broadcast());
    }
}
