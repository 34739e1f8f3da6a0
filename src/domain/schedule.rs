//! Round-trip schedule: randomized spacing and wrap sizing.
//!
//! Iterations are spread over a total duration. Each gap is drawn
//! uniformly from `[0.5 × avg, 1.5 × avg]` where
//! `avg = total / iterations`.

use std::time::Duration;

use alloy::primitives::U256;
use rand::Rng;

/// Basis points in one whole.
const BPS_DENOMINATOR: u64 = 10_000;

/// Randomized delay between iterations.
#[derive(Debug, Clone, Copy)]
pub struct IterationDelay {
    average: Duration,
}

impl IterationDelay {
    /// Spread `iterations` over `total`. Zero iterations means no delay.
    pub fn new(total: Duration, iterations: u32) -> Self {
        let average = if iterations == 0 {
            Duration::ZERO
        } else {
            total / iterations
        };
        Self { average }
    }

    pub const fn average(&self) -> Duration {
        self.average
    }

    /// Inclusive lower and upper bound of a drawn delay.
    pub fn bounds(&self) -> (Duration, Duration) {
        (self.average / 2, self.average * 3 / 2)
    }

    /// Draw a delay with the thread-local RNG.
    pub fn sample(&self) -> Duration {
        self.sample_with(&mut rand::thread_rng())
    }

    /// Draw a delay with the supplied RNG.
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (lo, hi) = self.bounds();
        let lo_ms = u64::try_from(lo.as_millis()).unwrap_or(u64::MAX);
        let hi_ms = u64::try_from(hi.as_millis()).unwrap_or(u64::MAX);
        if hi_ms <= lo_ms {
            return lo;
        }
        Duration::from_millis(rng.gen_range(lo_ms..=hi_ms))
    }
}

/// Share of a balance to wrap, held in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapFraction {
    bps: u64,
}

impl WrapFraction {
    /// From a fraction in `(0, 1]`; values outside are clamped.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_fraction(fraction: f64) -> Self {
        let bps = (fraction.clamp(0.0, 1.0) * BPS_DENOMINATOR as f64).round() as u64;
        Self { bps }
    }

    pub const fn bps(&self) -> u64 {
        self.bps
    }

    /// `balance × bps / 10_000`, rounded down.
    pub fn apply(&self, balance: U256) -> U256 {
        balance.saturating_mul(U256::from(self.bps)) / U256::from(BPS_DENOMINATOR)
    }
}
