//! Tolerance profiles for perceptual comparison.

use crate::result::{RasterproofError, RasterproofResult};
use serde::{Deserialize, Serialize};

/// Pass/fail thresholds for comparing two page rasters
///
/// Both limits must hold for the rasters to be judged equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceProfile {
    /// Maximum fraction (0.0-1.0) of pixels that may differ
    pub frac_pixels: f64,
    /// Maximum mean distance (0-255 scale) among the differing pixels
    pub mean_distance: f64,
}

impl Default for ToleranceProfile {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ToleranceProfile {
    /// Profile for transforms that must not change the rendering
    pub const IDENTITY: Self = Self {
        frac_pixels: 1.0e-4,
        mean_distance: 10.0,
    };

    /// No differing pixel allowed
    pub const EXACT: Self = Self {
        frac_pixels: 0.0,
        mean_distance: 0.0,
    };

    /// Create a profile
    #[must_use]
    pub const fn new(frac_pixels: f64, mean_distance: f64) -> Self {
        Self {
            frac_pixels,
            mean_distance,
        }
    }

    /// Set the differing-pixel fraction
    #[must_use]
    pub const fn with_frac_pixels(mut self, frac_pixels: f64) -> Self {
        self.frac_pixels = frac_pixels;
        self
    }

    /// Set the mean distance limit
    #[must_use]
    pub const fn with_mean_distance(mut self, mean_distance: f64) -> Self {
        self.mean_distance = mean_distance;
        self
    }

    /// Whether `other` is at least as lenient as `self` on both limits
    #[must_use]
    pub fn is_relaxed_by(&self, other: &Self) -> bool {
        other.frac_pixels >= self.frac_pixels && other.mean_distance >= self.mean_distance
    }

    /// Check both limits are inside their domains.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTolerance` for a fraction outside `[0, 1]` or a
    /// negative / non-finite mean distance
    pub fn validate(&self) -> RasterproofResult<()> {
        if !(0.0..=1.0).contains(&self.frac_pixels) {
            return Err(RasterproofError::InvalidTolerance {
                message: format!("frac_pixels {} outside [0, 1]", self.frac_pixels),
            });
        }
        if !self.mean_distance.is_finite() || self.mean_distance < 0.0 {
            return Err(RasterproofError::InvalidTolerance {
                message: format!("mean_distance {} must be >= 0", self.mean_distance),
            });
        }
        Ok(())
    }
}
