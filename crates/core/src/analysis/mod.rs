//! Audio feature extraction shared by the visualisers.
//!
//! Everything here consumes byte snapshots produced by an
//! [`AudioFeatureSource`](crate::audio::AudioFeatureSource): band energies,
//! overall energy, waveform pulse and the beat impulse tracker. The
//! [`spectrum`] submodule holds the analyser that produces those snapshots.

pub mod spectrum;

use serde::{Deserialize, Serialize};

pub use spectrum::Analyser;

/// Snapshots shorter than this cannot be split into bands.
pub const MIN_BAND_BINS: usize = 8;

const BEAT_SMOOTHING: f32 = 0.85;
const BEAT_THRESHOLD: f32 = 0.12;
const BEAT_GAIN: f32 = 3.0;
const BEAT_DECAY: f32 = 0.92;

/// Normalised energy of the low, mid and high frequency bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl Bands {
    pub fn splat(value: f32) -> Self {
        Self {
            low: value,
            mid: value,
            high: value,
        }
    }

    /// Clamps every band into `[0, 1]`; gain may push raw values above one.
    pub fn clamped(self) -> Self {
        Self {
            low: self.low.clamp(0.0, 1.0),
            mid: self.mid.clamp(0.0, 1.0),
            high: self.high.clamp(0.0, 1.0),
        }
    }
}

/// Splits a frequency snapshot into three bands and returns each band's mean
/// magnitude normalised by 255 and scaled by `gain`.
///
/// * low: the first eighth of the bins
/// * mid: from one quarter to one half
/// * high: from one half to the end
///
/// Snapshots with fewer than [`MIN_BAND_BINS`] bins return `neutral` for all
/// three bands.
pub fn extract_bands(frequency: &[u8], gain: f32, neutral: f32) -> Bands {
    let len = frequency.len();
    if len < MIN_BAND_BINS {
        return Bands::splat(neutral);
    }

    Bands {
        low: mean_level(&frequency[..len / 8]) * gain,
        mid: mean_level(&frequency[len / 4..len / 2]) * gain,
        high: mean_level(&frequency[len / 2..]) * gain,
    }
}

/// Mean normalised magnitude of the whole snapshot, scaled by `gain`.
pub fn mean_energy(frequency: &[u8], gain: f32) -> f32 {
    mean_level(frequency) * gain
}

/// Mean absolute deviation of a time-domain snapshot from its 128 midpoint,
/// normalised to `[0, 1]`.
pub fn wave_pulse(time: &[u8]) -> f32 {
    if time.is_empty() {
        return 0.0;
    }

    let deviation: u64 = time
        .iter()
        .map(|&sample| u64::from(sample.abs_diff(128)))
        .sum();
    (deviation as f32 / time.len() as f32 / 128.0).clamp(0.0, 1.0)
}

/// Magnitude of one bin normalised to `[0, 1]`.
#[inline]
pub fn level(magnitude: u8) -> f32 {
    f32::from(magnitude) / 255.0
}

fn mean_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }

    let sum: u64 = bins.iter().map(|&bin| u64::from(bin)).sum();
    sum as f32 / (bins.len() as f32 * 255.0)
}

/// Beat tracker state, refreshed once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatState {
    pub previous_energy: f32,
    /// Exponential moving average of the frame energy.
    pub smoothed_energy: f32,
    /// Decaying onset signal in `[0, 1]`.
    pub impulse: f32,
}

/// Emits a percussive impulse whenever the smoothed energy jumps upward
/// sharply, then lets it decay geometrically.
#[derive(Debug, Clone, Default)]
pub struct BeatDetector {
    state: BeatState,
}

impl BeatDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BeatState {
        self.state
    }

    pub fn impulse(&self) -> f32 {
        self.state.impulse
    }

    pub fn smoothed_energy(&self) -> f32 {
        self.state.smoothed_energy
    }

    pub fn reset(&mut self) {
        self.state = BeatState::default();
    }

    /// Advances the tracker by one frame and returns the new impulse.
    pub fn update(&mut self, energy: f32) -> f32 {
        let energy = if energy.is_finite() { energy.max(0.0) } else { 0.0 };
        let state = &mut self.state;

        state.smoothed_energy =
            BEAT_SMOOTHING * state.smoothed_energy + (1.0 - BEAT_SMOOTHING) * energy;
        let delta = state.smoothed_energy - state.previous_energy;
        if delta > BEAT_THRESHOLD {
            // Onsets replace the running impulse rather than stacking on it.
            state.impulse = (delta * BEAT_GAIN).min(1.0);
        }
        state.impulse *= BEAT_DECAY;
        state.previous_energy = state.smoothed_energy;

        state.impulse
    }
}
