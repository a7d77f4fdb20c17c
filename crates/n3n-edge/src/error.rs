// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types surfaced by the edge runtime.
//!
//! Recovery policy lives with the call sites that match on these variants,
//! not here: decode/crypto/replay errors are dropped and counted, resolve
//! failures shorten the resolver cycle, pool-full stops accepting, and the
//! rest are fatal at startup. See `EdgeRuntime` for where each is handled.

use std::fmt;
use std::io;

/// Errors produced by the edge runtime and its collaborators.
#[derive(Debug)]
pub enum EdgeError {
    /// A configuration value failed validation before startup.
    ConfigInvalid(String),
    /// A supernode hostname could not be resolved.
    ResolveFailed(String),
    /// Binding a listening or UDP socket failed.
    BindFailed(io::Error),
    /// The TAP device could not be opened.
    TapOpenFailed(String),
    /// A received datagram failed to decode as a valid n2n message.
    DecodeError(&'static str),
    /// Encryption or decryption of a payload failed.
    CryptoFailed(&'static str),
    /// A replay-protected timestamp was rejected.
    ReplayRejected,
    /// The management slot pool has no free slots.
    PoolFull,
    /// A generic I/O error not covered by a more specific variant.
    IoError(io::Error),
    /// An operation exceeded its allotted time.
    Timeout,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EdgeError>;

impl fmt::Display for EdgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
            Self::ResolveFailed(msg) => write!(f, "resolve failed: {msg}"),
            Self::BindFailed(err) => write!(f, "bind failed: {err}"),
            Self::TapOpenFailed(msg) => write!(f, "tap open failed: {msg}"),
            Self::DecodeError(msg) => write!(f, "decode error: {msg}"),
            Self::CryptoFailed(msg) => write!(f, "crypto failed: {msg}"),
            Self::ReplayRejected => write!(f, "replay-protected timestamp rejected"),
            Self::PoolFull => write!(f, "connection slot pool is full"),
            Self::IoError(err) => write!(f, "I/O error: {err}"),
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for EdgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BindFailed(err) | Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for EdgeError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let err = EdgeError::ConfigInvalid("bad community name".into());
        assert!(err.to_string().contains("invalid configuration"));

        let err = EdgeError::ReplayRejected;
        assert!(err.to_string().contains("replay"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err: EdgeError = io_err.into();
        assert!(matches!(err, EdgeError::IoError(_)));
    }
}
