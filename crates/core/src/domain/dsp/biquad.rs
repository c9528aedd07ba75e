//! Biquad filter: second-order IIR building block for all tone shaping
//!
//! Coefficients come from the audio-EQ-cookbook design equations and are
//! memoized per parameter tuple; per-channel state lives in [`BiquadState`]
//! values that are owned by exactly one `(stage, channel)` pair. Cross-channel
//! state sharing is a correctness bug: channels are independent decorrelated
//! signals and must never see each other's filter history.

use super::params;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Supported filter responses
///
/// A tagged enum so the real-time path dispatches on a discriminant, not a
/// string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Peaking,
    HighShelf,
}

/// Full parameter tuple a coefficient set is derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub frequency: f32,
    pub q: f32,
    pub gain_db: f32,
    pub sample_rate: f32,
}

impl FilterSpec {
    pub fn new(kind: FilterKind, frequency: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        Self {
            kind,
            frequency,
            q,
            gain_db,
            sample_rate,
        }
    }

    /// Clamp to ranges that keep the designed filter stable
    ///
    /// Frequency stays inside (0, nyquist); Q stays away from zero.
    fn clamped(self) -> Self {
        let nyquist = self.sample_rate * 0.5;
        Self {
            frequency: self.frequency.clamp(params::FREQ_MIN, nyquist * 0.99),
            q: self.q.clamp(params::Q_MIN, params::Q_MAX),
            gain_db: self.gain_db.clamp(-params::DB_MAX, params::DB_MAX),
            ..self
        }
    }
}

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability. a0 is folded into
/// the other coefficients at design time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Design coefficients for the given parameter tuple
    ///
    /// Uses the standard audio-EQ-cookbook equations:
    /// ω0 = 2π·f/fs, α = sin ω0 / (2Q), A = 10^(gain/40).
    /// Out-of-range frequency and Q are clamped to safe bounds first.
    #[must_use]
    pub fn design(spec: FilterSpec) -> Self {
        let spec = spec.clamped();
        let w0 = 2.0 * std::f32::consts::PI * spec.frequency / spec.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * spec.q);
        let a = 10.0_f32.powf(spec.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match spec.kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 * 0.5;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::Highpass => {
                let b1 = -(1.0 + cos_w0);
                let b0 = (1.0 + cos_w0) * 0.5;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterKind::HighShelf => {
                let sqrt_a = a.sqrt();
                let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha);
                let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
                let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha);
                let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha;
                let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
                let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha;
                (b0, b1, b2, a0, a1, a2)
            }
        };

        // Normalize by a0
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Run one Direct Form I step against externally owned state
    ///
    /// y[n] = b0·x[n] + b1·x[n-1] + b2·x[n-2] − a1·y[n-1] − a2·y[n-2]
    #[inline]
    pub fn process(&self, state: &mut BiquadState, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * state.x1 + self.b2 * state.x2
            - self.a1 * state.y1
            - self.a2 * state.y2;

        state.x2 = state.x1;
        state.x1 = x;
        state.y2 = state.y1;
        state.y1 = y;

        y
    }
}

/// Per-channel filter history
///
/// Owned by exactly one `(filter instance, channel)` pair. Not `Copy` so a
/// state value cannot be silently duplicated across channel indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Memoized coefficient designer
///
/// Stores the last-seen parameter tuple and its derived coefficients;
/// recomputes only when parameters change so the transcendental design math
/// stays off the steady-state block path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoeffCache {
    last_spec: Option<FilterSpec>,
    coeffs: BiquadCoeffs,
}

impl CoeffCache {
    pub fn new() -> Self {
        Self {
            last_spec: None,
            coeffs: BiquadCoeffs::default(),
        }
    }

    /// Get coefficients for `spec`, recomputing only on parameter change
    pub fn get(&mut self, spec: FilterSpec) -> BiquadCoeffs {
        if self.last_spec != Some(spec) {
            self.coeffs = BiquadCoeffs::design(spec);
            self.last_spec = Some(spec);
            trace!(
                kind = ?spec.kind,
                frequency = spec.frequency,
                q = spec.q,
                gain_db = spec.gain_db,
                "Biquad coefficients recomputed"
            );
        }
        self.coeffs
    }
}

impl Default for CoeffCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateful biquad filter: one coefficient set plus one channel of history
///
/// Stages that filter stereo material hold one `BiquadFilter` per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::new(),
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::default())
    }

    /// Update filter coefficients, keeping state
    ///
    /// Safe to call in real time on parameter changes.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.coeffs.process(&mut self.state, x)
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    fn sine(freq: f32, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    #[test]
    fn test_biquad_unity() {
        let mut filter = BiquadFilter::bypass();
        let input = vec![0.5, 0.3, 0.7];
        let mut output = input.clone();
        filter.process(&mut output);
        for (i, o) in input.iter().zip(output.iter()) {
            assert!((i - o).abs() < 1e-6);
        }
    }

    #[test]
    fn test_lowpass_minus_3db_at_cutoff() {
        // Butterworth Q: a sine at the cutoff should come out ~3 dB down.
        let cutoff = 1000.0;
        let spec = FilterSpec::new(FilterKind::Lowpass, cutoff, 0.707, 0.0, SAMPLE_RATE);
        let mut filter = BiquadFilter::new(BiquadCoeffs::design(spec));

        let mut signal = sine(cutoff, 48000);
        filter.process(&mut signal);

        // Measure steady state only (skip the transient).
        let steady = &signal[24000..];
        let atten_db = 20.0 * peak(steady).log10();
        assert!(
            (atten_db - -3.0).abs() < 0.3,
            "expected ~-3 dB at cutoff, got {atten_db:.2} dB"
        );
    }

    #[test]
    fn test_highpass_rejects_low_frequency() {
        let spec = FilterSpec::new(FilterKind::Highpass, 1000.0, 0.707, 0.0, SAMPLE_RATE);
        let mut filter = BiquadFilter::new(BiquadCoeffs::design(spec));

        let mut signal = sine(50.0, 48000);
        filter.process(&mut signal);

        let steady_peak = peak(&signal[24000..]);
        assert!(
            steady_peak < 0.01,
            "50 Hz should be strongly rejected, peak was {steady_peak}"
        );
    }

    #[test]
    fn test_peaking_boosts_center() {
        let spec = FilterSpec::new(FilterKind::Peaking, 1000.0, 1.0, 6.0, SAMPLE_RATE);
        let mut filter = BiquadFilter::new(BiquadCoeffs::design(spec));

        let mut signal = sine(1000.0, 48000);
        filter.process(&mut signal);

        let gain_db = 20.0 * peak(&signal[24000..]).log10();
        assert!(
            (gain_db - 6.0).abs() < 0.5,
            "expected ~+6 dB at center, got {gain_db:.2} dB"
        );
    }

    #[test]
    fn test_design_clamps_unsafe_parameters() {
        // Negative frequency and zero Q must not produce NaN coefficients.
        let spec = FilterSpec::new(FilterKind::Lowpass, -10.0, 0.0, 0.0, SAMPLE_RATE);
        let coeffs = BiquadCoeffs::design(spec);
        assert!(coeffs.b0.is_finite());
        assert!(coeffs.a1.is_finite());
        assert!(coeffs.a2.is_finite());

        let above_nyquist = FilterSpec::new(FilterKind::Highpass, 96000.0, 0.707, 0.0, SAMPLE_RATE);
        let coeffs = BiquadCoeffs::design(above_nyquist);
        assert!(coeffs.b0.is_finite());
    }

    #[test]
    fn test_coeff_cache_recomputes_only_on_change() {
        let mut cache = CoeffCache::new();
        let spec = FilterSpec::new(FilterKind::Lowpass, 120.0, 0.707, 0.0, SAMPLE_RATE);

        let first = cache.get(spec);
        let second = cache.get(spec);
        assert_eq!(first, second);

        let changed = cache.get(FilterSpec { frequency: 240.0, ..spec });
        assert_ne!(first, changed);
    }

    #[test]
    fn test_biquad_reset() {
        let spec = FilterSpec::new(FilterKind::Lowpass, 200.0, 0.707, 0.0, SAMPLE_RATE);
        let mut filter = BiquadFilter::new(BiquadCoeffs::design(spec));

        let mut buffer = vec![0.5; 100];
        filter.process(&mut buffer);

        filter.reset();
        let mut silence = vec![0.0; 10];
        filter.process(&mut silence);
        assert!(silence.iter().all(|&s| s.abs() < 1e-9));
    }

    #[test]
    fn test_state_is_per_instance() {
        // Two filters with identical coefficients but separate state must not
        // leak history into each other.
        let spec = FilterSpec::new(FilterKind::Lowpass, 500.0, 0.707, 0.0, SAMPLE_RATE);
        let coeffs = BiquadCoeffs::design(spec);
        let mut left = BiquadFilter::new(coeffs);
        let mut right = BiquadFilter::new(coeffs);

        let mut left_buf = vec![1.0; 64];
        left.process(&mut left_buf);

        // Right channel sees silence; its output must stay silent.
        let mut right_buf = vec![0.0; 64];
        right.process(&mut right_buf);
        assert!(right_buf.iter().all(|&s| s == 0.0));
    }
}
