// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire encoding/decoding of n2n protocol messages.
//!
//! Every message shares a common header: a flags/version byte, a TTL byte,
//! a big-endian 16-bit message type, and a 20-byte zero-padded community
//! name. Decoding never allocates -- [`N2nMessage::Packet`]'s payload
//! borrows directly from the input slice.

use crate::error::EdgeError;
use crate::mac::{Mac, MAC_SIZE};

/// Length of the zero-padded community name field on the wire.
pub const COMMUNITY_SIZE: usize = 20;
const HEADER_SIZE: usize = 1 + 1 + 2 + COMMUNITY_SIZE;
const PROTOCOL_VERSION: u8 = 3;

/// Tagged n2n message types, in the order assigned on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u16)]
pub enum MessageType {
    Register = 1,
    Deregister = 2,
    Packet = 3,
    RegisterAck = 4,
    RegisterSuper = 5,
    RegisterSuperAck = 6,
    RegisterSuperNak = 7,
    Federation = 8,
}

impl MessageType {
    fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::Register,
            2 => Self::Deregister,
            3 => Self::Packet,
            4 => Self::RegisterAck,
            5 => Self::RegisterSuper,
            6 => Self::RegisterSuperAck,
            7 => Self::RegisterSuperNak,
            8 => Self::Federation,
            _ => return None,
        })
    }
}

/// A decoded or to-be-encoded n2n message. Borrows its payload (for
/// [`Self::Packet`]) from whatever buffer it was decoded out of.
#[derive(Debug)]
pub enum N2nMessage<'a> {
    Register {
        src_mac: Mac,
        dst_mac: Mac,
        timestamp: u64,
    },
    Deregister {
        src_mac: Mac,
    },
    Packet {
        src_mac: Mac,
        dst_mac: Mac,
        transform_id: u16,
        payload: &'a [u8],
    },
    RegisterAck {
        src_mac: Mac,
        dst_mac: Mac,
    },
    RegisterSuper {
        src_mac: Mac,
        timestamp: u64,
    },
    RegisterSuperAck {
        src_mac: Mac,
        timestamp: u64,
    },
    RegisterSuperNak {
        src_mac: Mac,
    },
    Federation {
        src_mac: Mac,
    },
}

impl N2nMessage<'_> {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Register { .. } => MessageType::Register,
            Self::Deregister { .. } => MessageType::Deregister,
            Self::Packet { .. } => MessageType::Packet,
            Self::RegisterAck { .. } => MessageType::RegisterAck,
            Self::RegisterSuper { .. } => MessageType::RegisterSuper,
            Self::RegisterSuperAck { .. } => MessageType::RegisterSuperAck,
            Self::RegisterSuperNak { .. } => MessageType::RegisterSuperNak,
            Self::Federation { .. } => MessageType::Federation,
        }
    }
}

fn community_field(community: &[u8]) -> [u8; COMMUNITY_SIZE] {
    let mut field = [0u8; COMMUNITY_SIZE];
    let n = community.len().min(COMMUNITY_SIZE);
    field[..n].copy_from_slice(&community[..n]);
    field
}

fn write_header(out: &mut Vec<u8>, ttl: u8, msg_type: MessageType, community: &[u8]) {
    out.push(PROTOCOL_VERSION);
    out.push(ttl);
    out.extend_from_slice(&(msg_type as u16).to_be_bytes());
    out.extend_from_slice(&community_field(community));
}

/// Encode `msg` into `out`, returning the number of bytes written.
pub fn encode(out: &mut Vec<u8>, community: &[u8], ttl: u8, msg: &N2nMessage<'_>) -> usize {
    let start = out.len();
    write_header(out, ttl, msg.message_type(), community);

    match msg {
        N2nMessage::Register { src_mac, dst_mac, timestamp } => {
            out.extend_from_slice(src_mac.as_bytes());
            out.extend_from_slice(dst_mac.as_bytes());
            out.extend_from_slice(&timestamp.to_be_bytes());
        }
        N2nMessage::Deregister { src_mac } => {
            out.extend_from_slice(src_mac.as_bytes());
        }
        N2nMessage::Packet { src_mac, dst_mac, transform_id, payload } => {
            out.extend_from_slice(src_mac.as_bytes());
            out.extend_from_slice(dst_mac.as_bytes());
            out.extend_from_slice(&transform_id.to_be_bytes());
            out.extend_from_slice(payload);
        }
        N2nMessage::RegisterAck { src_mac, dst_mac } => {
            out.extend_from_slice(src_mac.as_bytes());
            out.extend_from_slice(dst_mac.as_bytes());
        }
        N2nMessage::RegisterSuper { src_mac, timestamp }
        | N2nMessage::RegisterSuperAck { src_mac, timestamp } => {
            out.extend_from_slice(src_mac.as_bytes());
            out.extend_from_slice(&timestamp.to_be_bytes());
        }
        N2nMessage::RegisterSuperNak { src_mac } | N2nMessage::Federation { src_mac } => {
            out.extend_from_slice(src_mac.as_bytes());
        }
    }

    out.len() - start
}

fn read_mac(bytes: &[u8]) -> Mac {
    let mut raw = [0u8; MAC_SIZE];
    raw.copy_from_slice(&bytes[..MAC_SIZE]);
    Mac::from_bytes(raw)
}

/// A decoded message together with the header fields not folded into
/// [`N2nMessage`] itself.
#[derive(Debug)]
pub struct Decoded<'a> {
    pub ttl: u8,
    pub message: N2nMessage<'a>,
}

/// Decode a message out of `bytes`, verifying it belongs to `community`.
///
/// Returns borrowed payload views -- no allocation happens here.
pub fn decode<'a>(bytes: &'a [u8], community: &[u8]) -> Result<Decoded<'a>, EdgeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(EdgeError::DecodeError("message shorter than header"));
    }

    let ttl = bytes[1];
    let msg_type_raw = u16::from_be_bytes([bytes[2], bytes[3]]);
    let msg_type =
        MessageType::from_u16(msg_type_raw).ok_or(EdgeError::DecodeError("unknown message type"))?;

    let wire_community = &bytes[4..4 + COMMUNITY_SIZE];
    if wire_community != community_field(community) {
        return Err(EdgeError::DecodeError("community mismatch"));
    }

    let body = &bytes[HEADER_SIZE..];

    let message = decode_body(msg_type, body)?;
    Ok(Decoded { ttl, message })
}

fn decode_body(msg_type: MessageType, body: &[u8]) -> Result<N2nMessage<'_>, EdgeError> {
    match msg_type {
        MessageType::Register => {
            if body.len() < 2 * MAC_SIZE + 8 {
                return Err(EdgeError::DecodeError("short REGISTER body"));
            }
            let src_mac = read_mac(&body[0..MAC_SIZE]);
            let dst_mac = read_mac(&body[MAC_SIZE..2 * MAC_SIZE]);
            let timestamp = u64::from_be_bytes(body[2 * MAC_SIZE..2 * MAC_SIZE + 8].try_into().unwrap());
            Ok(N2nMessage::Register { src_mac, dst_mac, timestamp })
        }
        MessageType::Deregister => {
            if body.len() < MAC_SIZE {
                return Err(EdgeError::DecodeError("short DEREGISTER body"));
            }
            Ok(N2nMessage::Deregister { src_mac: read_mac(&body[0..MAC_SIZE]) })
        }
        MessageType::Packet => {
            if body.len() < 2 * MAC_SIZE + 2 {
                return Err(EdgeError::DecodeError("short PACKET body"));
            }
            let src_mac = read_mac(&body[0..MAC_SIZE]);
            let dst_mac = read_mac(&body[MAC_SIZE..2 * MAC_SIZE]);
            let transform_id = u16::from_be_bytes(body[2 * MAC_SIZE..2 * MAC_SIZE + 2].try_into().unwrap());
            let payload = &body[2 * MAC_SIZE + 2..];
            Ok(N2nMessage::Packet { src_mac, dst_mac, transform_id, payload })
        }
        MessageType::RegisterAck => {
            if body.len() < 2 * MAC_SIZE {
                return Err(EdgeError::DecodeError("short REGISTER_ACK body"));
            }
            let src_mac = read_mac(&body[0..MAC_SIZE]);
            let dst_mac = read_mac(&body[MAC_SIZE..2 * MAC_SIZE]);
            Ok(N2nMessage::RegisterAck { src_mac, dst_mac })
        }
        MessageType::RegisterSuper => {
            if body.len() < MAC_SIZE + 8 {
                return Err(EdgeError::DecodeError("short REGISTER_SUPER body"));
            }
            let src_mac = read_mac(&body[0..MAC_SIZE]);
            let timestamp = u64::from_be_bytes(body[MAC_SIZE..MAC_SIZE + 8].try_into().unwrap());
            Ok(N2nMessage::RegisterSuper { src_mac, timestamp })
        }
        MessageType::RegisterSuperAck => {
            if body.len() < MAC_SIZE + 8 {
                return Err(EdgeError::DecodeError("short REGISTER_SUPER_ACK body"));
            }
            let src_mac = read_mac(&body[0..MAC_SIZE]);
            let timestamp = u64::from_be_bytes(body[MAC_SIZE..MAC_SIZE + 8].try_into().unwrap());
            Ok(N2nMessage::RegisterSuperAck { src_mac, timestamp })
        }
        MessageType::RegisterSuperNak => {
            if body.len() < MAC_SIZE {
                return Err(EdgeError::DecodeError("short REGISTER_SUPER_NAK body"));
            }
            Ok(N2nMessage::RegisterSuperNak { src_mac: read_mac(&body[0..MAC_SIZE]) })
        }
        MessageType::Federation => {
            if body.len() < MAC_SIZE {
                return Err(EdgeError::DecodeError("short FEDERATION body"));
            }
            Ok(N2nMessage::Federation { src_mac: read_mac(&body[0..MAC_SIZE]) })
        }
    }
}
