//! Absolute plus relative numeric tolerance.

use modelport_common::HarnessConfig;
use serde::{Deserialize, Serialize};

/// Elements `a` (candidate) and `b` (reference) are close when
/// `|a - b| <= atol + rtol * |b|`. NaN on either side is never close, and an
/// infinity is close only to itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { atol: 1e-5, rtol: 1e-3 }
    }
}

impl Tolerance {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.atol, config.rtol)
    }

    pub fn is_close(&self, a: f32, b: f32) -> bool {
        let (a, b) = (f64::from(a), f64::from(b));
        if a.is_nan() || b.is_nan() {
            return false;
        }
        if a == b {
            return true;
        }
        if a.is_infinite() || b.is_infinite() {
            return false;
        }
        (a - b).abs() <= self.atol + self.rtol * b.abs()
    }

    /// Both bounds at least as loose as `other`'s.
    pub fn is_looser_or_equal(&self, other: &Tolerance) -> bool {
        self.atol >= other.atol && self.rtol >= other.rtol
    }
}
