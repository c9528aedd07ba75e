//! Broadcast-style loudness metering (momentary / short-term / integrated)
//!
//! The meter taps the signal read-only; it never modifies audio and never
//! blocks. K-weighting runs each channel through a highpass and a presence
//! high-shelf boost before energy accumulation.
//!
//! The weighting curve is a deliberate two-biquad approximation of the
//! BS.1770 reference pre-filter (60 Hz highpass, +4 dB shelf at 6.5 kHz),
//! kept for behavioral parity with the rest of the chain rather than strict
//! standard compliance. Loudness values therefore track relative changes
//! accurately; absolute readings can deviate from a compliance meter by a
//! fraction of an LU.

use crate::domain::dsp::biquad::{BiquadCoeffs, BiquadFilter, FilterKind, FilterSpec};
use crate::domain::dsp::limiter::inter_sample_peak;
use crate::domain::dsp::MAX_CHANNELS;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Momentary window length per BS.1770
const MOMENTARY_SECONDS: f32 = 0.4;
/// Short-term window length per BS.1770
const SHORT_TERM_SECONDS: f32 = 3.0;
/// Snapshot emission cadence
const REPORT_INTERVAL_SECONDS: f32 = 0.1;

/// Absolute gating threshold in LUFS
const ABSOLUTE_GATE_LUFS: f32 = -70.0;
/// Relative gate offset below the ungated loudness, in LU
const RELATIVE_GATE_LU: f32 = 10.0;

/// K-weighting highpass corner
const K_HIGHPASS_HZ: f32 = 60.0;
/// K-weighting presence shelf center and boost
const K_SHELF_HZ: f32 = 6500.0;
const K_SHELF_DB: f32 = 4.0;

/// Convert a mean-square energy to LUFS; zero energy reads -inf
#[inline]
fn lufs(mean_square: f32) -> f32 {
    if mean_square > 0.0 {
        -0.691 + 10.0 * mean_square.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Point-in-time loudness readings, emitted roughly every 100 ms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeteringSnapshot {
    pub momentary_lufs: f32,
    pub short_term_lufs: f32,
    pub integrated_lufs: f32,
    pub true_peak_db: f32,
}

impl MeteringSnapshot {
    pub fn silent() -> Self {
        Self {
            momentary_lufs: f32::NEG_INFINITY,
            short_term_lufs: f32::NEG_INFINITY,
            integrated_lufs: f32::NEG_INFINITY,
            true_peak_db: f32::NEG_INFINITY,
        }
    }
}

/// One accumulated measurement block
#[derive(Debug, Clone, Copy)]
struct EnergyBlock {
    /// Mean-square of the K-weighted signal over the block
    mean_square: f32,
    /// Block duration in seconds
    duration: f32,
}

/// Rolling duration-bounded window of energy blocks
///
/// Evicts from the front once the buffered duration exceeds the target
/// length, so the window always covers roughly the last `target` seconds.
struct LoudnessWindow {
    blocks: VecDeque<EnergyBlock>,
    total_duration: f32,
    target: f32,
}

impl LoudnessWindow {
    fn new(target: f32) -> Self {
        Self {
            blocks: VecDeque::new(),
            total_duration: 0.0,
            target,
        }
    }

    fn push(&mut self, block: EnergyBlock) {
        self.blocks.push_back(block);
        self.total_duration += block.duration;
        while self.total_duration > self.target {
            let Some(front) = self.blocks.front().copied() else {
                break;
            };
            if self.total_duration - front.duration < self.target {
                break;
            }
            self.blocks.pop_front();
            self.total_duration -= front.duration;
        }
    }

    /// Duration-weighted mean-square over the buffered blocks
    fn mean_square(&self) -> f32 {
        if self.total_duration <= 0.0 {
            return 0.0;
        }
        let sum: f32 = self
            .blocks
            .iter()
            .map(|b| b.mean_square * b.duration)
            .sum();
        sum / self.total_duration
    }

    fn clear(&mut self) {
        self.blocks.clear();
        self.total_duration = 0.0;
    }
}

/// Per-channel K-weighting filter pair
struct KWeighting {
    highpass: BiquadFilter,
    shelf: BiquadFilter,
}

impl KWeighting {
    fn new(sample_rate: f32) -> Self {
        let highpass = BiquadCoeffs::design(FilterSpec::new(
            FilterKind::Highpass,
            K_HIGHPASS_HZ,
            0.707,
            0.0,
            sample_rate,
        ));
        let shelf = BiquadCoeffs::design(FilterSpec::new(
            FilterKind::HighShelf,
            K_SHELF_HZ,
            0.707,
            K_SHELF_DB,
            sample_rate,
        ));
        Self {
            highpass: BiquadFilter::new(highpass),
            shelf: BiquadFilter::new(shelf),
        }
    }

    #[inline]
    fn weight(&mut self, x: f32) -> f32 {
        self.shelf.process_sample(self.highpass.process_sample(x))
    }

    fn reset(&mut self) {
        self.highpass.reset();
        self.shelf.reset();
    }
}

/// Loudness meter with gated integrated measurement
pub struct LoudnessMeter {
    sample_rate: f32,
    weighting: [KWeighting; MAX_CHANNELS],

    momentary: LoudnessWindow,
    short_term: LoudnessWindow,
    /// The integrated measurement keeps every block for gating; it never
    /// evicts for the lifetime of the session.
    integrated: Vec<EnergyBlock>,

    true_peak: f32,
    prev_raw: [f32; MAX_CHANNELS],
    since_report: f32,
}

impl LoudnessMeter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            weighting: [KWeighting::new(sample_rate), KWeighting::new(sample_rate)],
            momentary: LoudnessWindow::new(MOMENTARY_SECONDS),
            short_term: LoudnessWindow::new(SHORT_TERM_SECONDS),
            integrated: Vec::new(),
            true_peak: 0.0,
            prev_raw: [0.0; MAX_CHANNELS],
            since_report: 0.0,
        }
    }

    /// Measure one planar block and maybe emit a snapshot
    ///
    /// Read-only tap: the audio is not modified. Returns `Some` roughly
    /// every 100 ms of measured signal; the caller forwards the snapshot to
    /// the control thread without waiting on it.
    pub fn measure_block(&mut self, channels: &[&[f32]]) -> Option<MeteringSnapshot> {
        if channels.is_empty() || channels[0].is_empty() {
            return None;
        }
        let samples = channels[0].len();
        let active = channels.len().min(MAX_CHANNELS);

        let mut energy = 0.0_f64;
        for i in 0..samples {
            for ch in 0..active {
                let Some(&x) = channels[ch].get(i) else {
                    continue;
                };
                self.true_peak = self.true_peak.max(inter_sample_peak(self.prev_raw[ch], x));
                self.prev_raw[ch] = x;

                let weighted = self.weighting[ch].weight(x);
                energy += (weighted * weighted) as f64;
            }
        }

        let duration = samples as f32 / self.sample_rate;
        let block = EnergyBlock {
            // Channel powers sum; time averages.
            mean_square: (energy / samples as f64) as f32,
            duration,
        };
        self.momentary.push(block);
        self.short_term.push(block);
        self.integrated.push(block);

        self.since_report += duration;
        if self.since_report >= REPORT_INTERVAL_SECONDS {
            self.since_report = 0.0;
            Some(self.snapshot())
        } else {
            None
        }
    }

    /// Current readings; integrated loudness applies two-stage gating
    pub fn snapshot(&mut self) -> MeteringSnapshot {
        let snapshot = MeteringSnapshot {
            momentary_lufs: lufs(self.momentary.mean_square()),
            short_term_lufs: lufs(self.short_term.mean_square()),
            integrated_lufs: self.integrated_lufs(),
            true_peak_db: if self.true_peak > 0.0 {
                20.0 * self.true_peak.log10()
            } else {
                f32::NEG_INFINITY
            },
        };
        // True peak is per reporting period.
        self.true_peak = 0.0;
        snapshot
    }

    /// Gated integrated loudness over every block seen this session
    ///
    /// Two-stage gate: an ungated average sets a relative threshold 10 LU
    /// below it, floored at -70 LUFS absolute; energy is then re-averaged
    /// over only the blocks at or above that threshold. Digital silence
    /// never passes the absolute gate and reads -inf.
    fn integrated_lufs(&self) -> f32 {
        let total_duration: f32 = self.integrated.iter().map(|b| b.duration).sum();
        if total_duration <= 0.0 {
            return f32::NEG_INFINITY;
        }
        let ungated_ms = self
            .integrated
            .iter()
            .map(|b| b.mean_square * b.duration)
            .sum::<f32>()
            / total_duration;
        let gate = (lufs(ungated_ms) - RELATIVE_GATE_LU).max(ABSOLUTE_GATE_LUFS);

        let mut gated_energy = 0.0_f32;
        let mut gated_duration = 0.0_f32;
        for block in &self.integrated {
            if lufs(block.mean_square) >= gate {
                gated_energy += block.mean_square * block.duration;
                gated_duration += block.duration;
            }
        }
        if gated_duration <= 0.0 {
            return f32::NEG_INFINITY;
        }
        lufs(gated_energy / gated_duration)
    }

    /// Clear every window, the integrated store and the filter state
    pub fn reset(&mut self) {
        for w in &mut self.weighting {
            w.reset();
        }
        self.momentary.clear();
        self.short_term.clear();
        self.integrated.clear();
        self.true_peak = 0.0;
        self.prev_raw = [0.0; MAX_CHANNELS];
        self.since_report = 0.0;
        debug!("loudness meter reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;
    const BLOCK: usize = 4800; // 100 ms

    fn sine(freq: f32, amplitude: f32, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| {
                (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin() * amplitude
            })
            .collect()
    }

    fn feed_seconds(meter: &mut LoudnessMeter, signal: &dyn Fn(usize) -> Vec<f32>, seconds: f32) -> Vec<MeteringSnapshot> {
        let mut snapshots = Vec::new();
        let blocks = (seconds * SAMPLE_RATE / BLOCK as f32) as usize;
        for _ in 0..blocks {
            let left = signal(BLOCK);
            let right = signal(BLOCK);
            if let Some(s) = meter.measure_block(&[&left, &right]) {
                snapshots.push(s);
            }
        }
        snapshots
    }

    #[test]
    fn test_silence_reads_negative_infinity() {
        let mut meter = LoudnessMeter::new(SAMPLE_RATE);
        let snapshots = feed_seconds(&mut meter, &|n| vec![0.0; n], 2.0);
        let last = snapshots.last().expect("snapshots should be emitted");
        assert_eq!(last.integrated_lufs, f32::NEG_INFINITY);
        assert_eq!(last.momentary_lufs, f32::NEG_INFINITY);
        assert_eq!(last.true_peak_db, f32::NEG_INFINITY);
    }

    #[test]
    fn test_snapshot_cadence_is_roughly_100ms() {
        let mut meter = LoudnessMeter::new(SAMPLE_RATE);
        // 1 s of signal in 100 ms blocks -> ~10 snapshots.
        let snapshots = feed_seconds(&mut meter, &|n| sine(1000.0, 0.25, n), 1.0);
        assert_eq!(snapshots.len(), 10);
    }

    #[test]
    fn test_louder_signal_reads_louder() {
        let mut quiet_meter = LoudnessMeter::new(SAMPLE_RATE);
        let mut loud_meter = LoudnessMeter::new(SAMPLE_RATE);

        let quiet = feed_seconds(&mut quiet_meter, &|n| sine(1000.0, 0.05, n), 2.0);
        let loud = feed_seconds(&mut loud_meter, &|n| sine(1000.0, 0.5, n), 2.0);

        let q = quiet.last().unwrap().integrated_lufs;
        let l = loud.last().unwrap().integrated_lufs;
        // 20 dB amplitude difference must appear as ~20 LU.
        assert!(
            (l - q - 20.0).abs() < 1.0,
            "expected ~20 LU spread, got {}",
            l - q
        );
    }

    #[test]
    fn test_gating_excludes_silent_stretch() {
        // Loud program followed by a long silence: the gated integrated
        // value must stay near the loud reading instead of averaging down.
        let mut meter = LoudnessMeter::new(SAMPLE_RATE);
        feed_seconds(&mut meter, &|n| sine(1000.0, 0.5, n), 2.0);
        let loud = meter.snapshot().integrated_lufs;

        feed_seconds(&mut meter, &|n| vec![0.0; n], 4.0);
        let after = meter.snapshot().integrated_lufs;

        assert!(
            (after - loud).abs() < 0.5,
            "gated loudness drifted from {loud} to {after} across silence"
        );
    }

    #[test]
    fn test_true_peak_resets_between_reports() {
        let mut meter = LoudnessMeter::new(SAMPLE_RATE);
        feed_seconds(&mut meter, &|n| sine(1000.0, 0.9, n), 0.5);
        let hot = meter.snapshot().true_peak_db;
        assert!(hot > -2.0);

        feed_seconds(&mut meter, &|n| sine(1000.0, 0.01, n), 0.5);
        let quiet = meter.snapshot().true_peak_db;
        assert!(
            quiet < hot - 20.0,
            "true peak should reflect only the latest period"
        );
    }

    #[test]
    fn test_reset_clears_session() {
        let mut meter = LoudnessMeter::new(SAMPLE_RATE);
        feed_seconds(&mut meter, &|n| sine(1000.0, 0.5, n), 1.0);
        meter.reset();
        assert_eq!(meter.snapshot().integrated_lufs, f32::NEG_INFINITY);
    }

    #[test]
    fn test_meter_does_not_modify_audio() {
        let mut meter = LoudnessMeter::new(SAMPLE_RATE);
        let left = sine(440.0, 0.5, BLOCK);
        let copy = left.clone();
        meter.measure_block(&[&left]);
        assert_eq!(left, copy);
    }
}
