//! Lookup-table saturation
//!
//! A smooth, odd-symmetric tanh soft clip whose steepness is driven by a
//! single `amount` parameter in [0, 1]. The transfer curve is precomputed
//! into a fixed-length table and regenerated only when `amount` changes, so
//! the transcendental shaping function never runs per sample.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Number of table entries across the input range [-1, 1]
const TABLE_SIZE: usize = 1025;

/// Cached nonlinear transfer curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaturationCurve {
    amount: f32,
    table: Vec<f32>,
}

impl SaturationCurve {
    pub fn new(amount: f32) -> Self {
        let amount = amount.clamp(0.0, 1.0);
        Self {
            amount,
            table: Self::build_table(amount),
        }
    }

    /// Current shaping amount
    pub fn amount(&self) -> f32 {
        self.amount
    }

    /// Update the shaping amount, regenerating the table only on change
    pub fn set_amount(&mut self, amount: f32) {
        let amount = amount.clamp(0.0, 1.0);
        if amount != self.amount {
            self.amount = amount;
            self.table = Self::build_table(amount);
            trace!(amount, "Saturation curve regenerated");
        }
    }

    fn build_table(amount: f32) -> Vec<f32> {
        // Drive 1..5 across the amount range; tanh(drive·x)/tanh(drive)
        // stays monotonic and maps the endpoints to exactly +/-1.
        let drive = 1.0 + amount * 4.0;
        let norm = drive.tanh();
        (0..TABLE_SIZE)
            .map(|i| {
                let x = (i as f32 / (TABLE_SIZE - 1) as f32) * 2.0 - 1.0;
                (drive * x).tanh() / norm
            })
            .collect()
    }

    /// Map a sample through the curve by nearest table index
    ///
    /// Inputs beyond [-1, 1] clamp to the curve ends, so bounded input
    /// always yields bounded output.
    #[inline]
    pub fn shape(&self, x: f32) -> f32 {
        if self.amount <= 0.0 {
            return x;
        }
        let clamped = x.clamp(-1.0, 1.0);
        let pos = (clamped + 1.0) * 0.5 * (TABLE_SIZE - 1) as f32;
        // Nearest index; the table is dense enough that interpolation noise
        // sits far below the dither floor.
        let idx = (pos + 0.5) as usize;
        self.table[idx.min(TABLE_SIZE - 1)]
    }

    pub fn process(&self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.shape(*sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_amount_is_identity() {
        let curve = SaturationCurve::new(0.0);
        for x in [-1.0, -0.5, 0.0, 0.25, 1.0] {
            assert_eq!(curve.shape(x), x);
        }
    }

    #[test]
    fn test_odd_symmetry() {
        let curve = SaturationCurve::new(0.7);
        for i in 0..100 {
            let x = i as f32 / 100.0;
            assert!((curve.shape(x) + curve.shape(-x)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_bounded_output() {
        let curve = SaturationCurve::new(1.0);
        for x in [-10.0, -1.5, -1.0, 0.0, 1.0, 1.5, 10.0] {
            let y = curve.shape(x);
            assert!(y.abs() <= 1.0 + 1e-6, "shape({x}) = {y} out of bounds");
        }
    }

    #[test]
    fn test_monotonic() {
        let curve = SaturationCurve::new(0.9);
        let mut prev = curve.shape(-1.0);
        for i in 1..=200 {
            let x = i as f32 / 100.0 - 1.0;
            let y = curve.shape(x);
            assert!(y >= prev - 1e-6, "curve not monotonic at x={x}");
            prev = y;
        }
    }

    #[test]
    fn test_table_regenerated_only_on_change() {
        let mut curve = SaturationCurve::new(0.5);
        let before = curve.shape(0.5);
        curve.set_amount(0.5);
        assert_eq!(curve.shape(0.5), before);

        curve.set_amount(0.9);
        assert_ne!(curve.shape(0.5), before);
    }
}
