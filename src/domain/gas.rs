//! Randomized gas price selection within a configured band.
//!
//! Prices are in wei per gas. The band is half-open: `[min, max)`.
//! One price is rolled per logical action and reused across that
//! action's retries.

use rand::Rng;
use thiserror::Error;

/// Wei in one gwei.
pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Invalid gas band configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GasBandError {
    #[error("gas price lower bound must be positive")]
    ZeroMin,
    #[error("gas price band is empty: min {min} wei >= max {max} wei")]
    Empty { min: u128, max: u128 },
}

/// Half-open gas price band in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasBand {
    min: u128,
    max: u128,
}

impl GasBand {
    /// Band from wei bounds.
    pub fn new(min: u128, max: u128) -> Result<Self, GasBandError> {
        if min == 0 {
            return Err(GasBandError::ZeroMin);
        }
        if min >= max {
            return Err(GasBandError::Empty { min, max });
        }
        Ok(Self { min, max })
    }

    /// Band from gwei bounds, e.g. `0.11..0.15`.
    pub fn from_gwei(min_gwei: f64, max_gwei: f64) -> Result<Self, GasBandError> {
        Self::new(gwei_to_wei(min_gwei), gwei_to_wei(max_gwei))
    }

    pub const fn min(&self) -> u128 {
        self.min
    }

    pub const fn max(&self) -> u128 {
        self.max
    }
}

/// Convert a non-negative gwei amount to wei, rounding to the nearest wei.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn gwei_to_wei(gwei: f64) -> u128 {
    if gwei.is_finite() && gwei > 0.0 {
        (gwei * WEI_PER_GWEI as f64).round() as u128
    } else {
        0
    }
}

/// Convert wei to gwei for display.
#[allow(clippy::cast_precision_loss)]
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI as f64
}

/// Draws uniformly random gas prices from a [`GasBand`].
#[derive(Debug, Clone, Copy)]
pub struct GasPriceSelector {
    band: GasBand,
}

impl GasPriceSelector {
    pub const fn new(band: GasBand) -> Self {
        Self { band }
    }

    /// Uniform price in `[min, max)` using the thread-local RNG.
    pub fn select(&self) -> u128 {
        self.select_with(&mut rand::thread_rng())
    }

    /// Uniform price in `[min, max)` using the supplied RNG.
    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> u128 {
        rng.gen_range(self.band.min..self.band.max)
    }
}
