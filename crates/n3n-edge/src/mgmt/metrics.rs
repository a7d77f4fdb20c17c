// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Point-in-time counters exposed over the management plane, rendered as
//! JSON the same serde-free way the rest of this codebase's admin surface
//! does.
//!
//! The reactor is single-threaded, so unlike a cross-thread admin API these
//! counters are plain fields bumped directly from `EdgeRuntime` -- no
//! `Arc`/`Mutex` needed to share them with a request handler that runs on
//! the same thread.

use std::time::Instant;

/// Running totals for one edge runtime's lifetime.
#[derive(Debug, Clone)]
pub struct EdgeMetrics {
    pub decode_errors: u64,
    pub crypto_failures: u64,
    pub replay_rejected: u64,
    pub slot_timeouts: u64,
    pub packets_forwarded: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    start_time: Instant,
}

impl Default for EdgeMetrics {
    fn default() -> Self {
        Self {
            decode_errors: 0,
            crypto_failures: 0,
            replay_rejected: 0,
            slot_timeouts: 0,
            packets_forwarded: 0,
            bytes_sent: 0,
            bytes_received: 0,
            start_time: Instant::now(),
        }
    }
}

impl EdgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Render as a JSON object, in the same manual, dependency-free style
    /// as the rest of this codebase's management responses.
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"uptime_secs":{},"decode_errors":{},"crypto_failures":{},"replay_rejected":{},"slot_timeouts":{},"packets_forwarded":{},"bytes_sent":{},"bytes_received":{}}}"#,
            self.uptime_secs(),
            self.decode_errors,
            self.crypto_failures,
            self.replay_rejected,
            self.slot_timeouts,
            self.packets_forwarded,
            self.bytes_sent,
            self.bytes_received,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_render_zeroed_json() {
        let metrics = EdgeMetrics::new();
        let json = metrics.to_json();
        assert!(json.contains(r#""decode_errors":0"#));
        assert!(json.contains(r#""packets_forwarded":0"#));
    }

    #[test]
    fn counters_are_plain_fields_the_caller_bumps() {
        let mut metrics = EdgeMetrics::new();
        metrics.decode_errors += 1;
        metrics.packets_forwarded += 3;
        let json = metrics.to_json();
        assert!(json.contains(r#""decode_errors":1"#));
        assert!(json.contains(r#""packets_forwarded":3"#));
    }
}
