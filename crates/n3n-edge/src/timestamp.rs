// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replay-protected timestamp tokens.
//!
//! `time_stamp()` produces a monotonically non-decreasing 64-bit token laid
//! out as `SSSSSSSSUUUUUCCCF` in bits: 32 bits of seconds, then either 20
//! bits of microseconds + 8 bits of counter, or (once the counter-only flag
//! latches) 24 bits of counter, and a 4-bit flag field whose bit 0 is the
//! counter-only flag. The arithmetic below is a direct translation of the
//! reference branchless implementation and must stay bit-for-bit faithful
//! to it for wire compatibility -- this is not an area to "clean up".

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Allowed absolute deviation between a received timestamp and the local
/// clock before it is rejected outright.
pub const TIME_STAMP_FRAME: u64 = 1u64 << 36;

/// Allowed backward jitter relative to the last accepted timestamp from a
/// given peer; multiplied by 8 when the peer has latched counter-only mode.
pub const TIME_STAMP_JITTER: u64 = 1u64 << 8;

/// Source of wall-clock time, injectable so timestamp tests are deterministic.
pub trait Clock {
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn micros_since_epoch(clock: &dyn Clock) -> u64 {
    let since_epoch = clock.now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    (since_epoch.as_secs() << 32).wrapping_add((since_epoch.subsec_micros() as u64) << 12)
}

/// Generates replay-protected timestamp tokens for one process.
///
/// `previously_issued` is a field on a value the edge runtime owns for its
/// lifetime, rather than a shared global, so tests can run multiple
/// independent generators.
#[derive(Debug, Default)]
pub struct TimeStampGenerator {
    previously_issued: u64,
}

impl TimeStampGenerator {
    pub fn new() -> Self {
        Self { previously_issued: 0 }
    }

    /// Issue a new token for the current time, guaranteed `>` every token
    /// previously issued by this generator.
    pub fn time_stamp(&mut self) -> u64 {
        self.time_stamp_with_clock(&SystemClock)
    }

    /// Same as [`Self::time_stamp`] but with an injectable clock, for tests.
    pub fn time_stamp_with_clock(&mut self, clock: &dyn Clock) -> u64 {
        let mut micro_seconds = micros_since_epoch(clock);

        let co = (self.previously_issued << 63) >> 63;
        let mut mask_lo = 0u64.wrapping_sub(co);
        mask_lo >>= 32;
        mask_lo |= (!mask_lo) >> 52;
        let mut mask_hi = !mask_lo;

        let hi_unchanged =
            u64::from((self.previously_issued & mask_hi) == (micro_seconds & mask_hi));

        let mut counter = (self.previously_issued & mask_lo) >> 4;
        counter = counter.wrapping_add(hi_unchanged);
        counter &= 0u64.wrapping_sub(hi_unchanged);
        counter <<= 4;

        let new_co = (u64::from((counter & mask_lo) == 0) & hi_unchanged) | co;

        mask_lo = 0u64.wrapping_sub(new_co);
        mask_lo >>= 32;
        mask_lo |= (!mask_lo) >> 52;
        mask_hi = !mask_lo;

        micro_seconds &= mask_hi;
        micro_seconds |= counter;
        micro_seconds |= new_co;

        self.previously_issued = micro_seconds;
        micro_seconds
    }

    /// Verify that `token` is close to the current time and, if `previous`
    /// is given, strictly newer than it (within jitter tolerance). On
    /// acceptance, raises `*previous` to `max(*previous, token)`.
    pub fn verify_and_update(
        &mut self,
        token: u64,
        previous: Option<&mut u64>,
        allow_jitter: bool,
    ) -> bool {
        self.verify_and_update_with_clock(token, previous, allow_jitter, &SystemClock)
    }

    pub fn verify_and_update_with_clock(
        &mut self,
        token: u64,
        previous: Option<&mut u64>,
        allow_jitter: bool,
        clock: &dyn Clock,
    ) -> bool {
        let co = (token << 63) >> 63;
        let now = self.time_stamp_with_clock(clock);

        let frame_diff = (token as i64).wrapping_sub(now as i64);
        if frame_diff.unsigned_abs() >= TIME_STAMP_FRAME {
            return false;
        }

        if let Some(previous) = previous {
            let mut diff = (token as i64).wrapping_sub(*previous as i64);
            if allow_jitter {
                diff = diff.wrapping_add((TIME_STAMP_JITTER << (co << 3)) as i64);
            }
            if diff <= 0 {
                return false;
            }
            *previous = token.max(*previous);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(SystemTime);

    impl Clock for FixedClock {
        fn now(&self) -> SystemTime {
            self.0
        }
    }

    fn fixed_clock_at_secs(secs: u64) -> FixedClock {
        FixedClock(UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn tokens_strictly_increase() {
        let mut gen = TimeStampGenerator::new();
        let clock = fixed_clock_at_secs(1_700_000_000);
        let t1 = gen.time_stamp_with_clock(&clock);
        let t2 = gen.time_stamp_with_clock(&clock);
        assert!(t2 > t1);
    }

    #[test]
    fn fresh_token_from_self_always_verifies() {
        let mut gen = TimeStampGenerator::new();
        let clock = fixed_clock_at_secs(1_700_000_000);
        let mut previous = 0u64;
        let token = gen.time_stamp_with_clock(&clock);
        assert!(gen.verify_and_update_with_clock(token, Some(&mut previous), false, &clock));
        assert!(previous >= token);
    }

    #[test]
    fn rejects_token_older_than_previous_but_accepts_newer_one() {
        let mut gen = TimeStampGenerator::new();
        let clock = fixed_clock_at_secs(1_700_000_000);
        let t1 = gen.time_stamp_with_clock(&clock);
        let mut previous = t1;

        assert!(!gen.verify_and_update_with_clock(t1.wrapping_sub(1 << 4), Some(&mut previous), false, &clock));

        let t2 = gen.time_stamp_with_clock(&clock);
        assert!(t2 > t1);
        assert!(gen.verify_and_update_with_clock(t2, Some(&mut previous), false, &clock));
        assert_eq!(previous, t2);
    }

    #[test]
    fn rejects_token_far_outside_frame() {
        let mut gen = TimeStampGenerator::new();
        let clock = fixed_clock_at_secs(1_700_000_000);
        let far_future = u64::MAX;
        assert!(!gen.verify_and_update_with_clock(far_future, None, false, &clock));
    }
}
