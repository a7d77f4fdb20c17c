// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The payload transform boundary.
//!
//! Real symmetric ciphers are out of scope here (see the crate's top-level
//! docs); what's pinned down is the seam the rest of the edge calls through,
//! keeping cipher backends behind a small trait object rather than
//! hard-wiring one implementation into the I/O path.

use std::any::Any;
use std::fmt;

use crate::error::EdgeError;

/// Identifies which transform a PACKET was encoded with, carried on the
/// wire so the receiving edge picks a matching decoder.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TransformId(pub u16);

impl TransformId {
    pub const NULL: TransformId = TransformId(0);
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transform#{}", self.0)
    }
}

/// A symmetric payload encoder/decoder keyed by some implementation-defined
/// key schedule.
///
/// `key_schedule` is `&dyn Any` rather than an associated type so the edge
/// runtime can hold a single `Box<dyn Transform>` per community without
/// becoming generic over the key material of whichever cipher is configured.
pub trait Transform: Send + Sync {
    fn id(&self) -> TransformId;
    fn header_len(&self) -> usize;
    fn encode(&self, key_schedule: &dyn Any, plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), EdgeError>;
    fn decode(&self, key_schedule: &dyn Any, ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), EdgeError>;
}

/// Identity transform: copies bytes through unchanged. Used for communities
/// configured without encryption and as the default when no real cipher is
/// wired in.
#[derive(Debug, Default)]
pub struct NullTransform;

impl Transform for NullTransform {
    fn id(&self) -> TransformId {
        TransformId::NULL
    }

    fn header_len(&self) -> usize {
        0
    }

    fn encode(&self, _key_schedule: &dyn Any, plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), EdgeError> {
        out.extend_from_slice(plaintext);
        Ok(())
    }

    fn decode(&self, _key_schedule: &dyn Any, ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), EdgeError> {
        out.extend_from_slice(ciphertext);
        Ok(())
    }
}
