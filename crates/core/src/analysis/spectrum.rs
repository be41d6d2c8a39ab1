use std::{collections::VecDeque, f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AudioConfig, AnalysisWindow, Result};

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Byte-valued spectrum and waveform analyser.
///
/// Keeps the most recent `2 × N` samples and turns them into the snapshot
/// format consumed by the visualisers: `N` frequency magnitudes mapped from
/// the `[-100, -30]` dB range onto `0..=255`, and `2 × N` waveform bytes
/// centred on 128. Snapshots are recomputed lazily, only after new samples
/// arrive, so temporal smoothing advances once per refresh.
pub struct Analyser {
    window: AnalysisWindow,
    smoothing: f32,
    samples: VecDeque<f32>,
    blackman: Vec<f32>,
    smoothed: Vec<f32>,
    frequency: Vec<u8>,
    time: Vec<u8>,
    dirty: bool,
    fft_planner: RealFftPlanner<f32>,
    fft: FftResources,
}

impl Analyser {
    pub fn new(config: &AudioConfig) -> Self {
        let mut fft_planner = RealFftPlanner::new();
        let fft = FftResources::plan(&mut fft_planner, config.window.time_samples());
        let mut analyser = Self {
            window: config.window,
            smoothing: config.smoothing.clamp(0.0, 1.0),
            samples: VecDeque::new(),
            blackman: Vec::new(),
            smoothed: Vec::new(),
            frequency: Vec::new(),
            time: Vec::new(),
            dirty: false,
            fft_planner,
            fft,
        };
        analyser.rebuild_buffers();
        analyser
    }

    pub fn window(&self) -> AnalysisWindow {
        self.window
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Changes the analysis window. Buffers are rebuilt and any buffered
    /// audio is discarded.
    pub fn set_window(&mut self, window: AnalysisWindow) {
        if window == self.window {
            return;
        }
        self.window = window;
        self.fft = FftResources::plan(&mut self.fft_planner, window.time_samples());
        self.rebuild_buffers();
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        if smoothing.is_finite() {
            self.smoothing = smoothing.clamp(0.0, 1.0);
        }
    }

    /// Appends mono samples in `[-1, 1]`. Only the newest `2 × N` are kept.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let capacity = self.window.time_samples();
        let incoming = &samples[samples.len().saturating_sub(capacity)..];
        let overflow = (self.samples.len() + incoming.len()).saturating_sub(capacity);
        self.samples.drain(..overflow);
        self.samples.extend(
            incoming
                .iter()
                .map(|&sample| if sample.is_finite() { sample } else { 0.0 }),
        );
        self.dirty = true;
    }

    /// Clears buffered audio and smoothing history.
    pub fn reset(&mut self) {
        self.rebuild_buffers();
    }

    /// Recomputes both snapshots if new samples arrived since the last call.
    pub fn refresh(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let len = self.window.time_samples();
        // Left-pad with silence until the window has filled up.
        let padding = len - self.samples.len();
        for (slot, value) in self.fft.input.iter_mut().zip(
            std::iter::repeat(0.0)
                .take(padding)
                .chain(self.samples.iter().copied()),
        ) {
            *slot = value;
        }

        for (index, value) in self.fft.input.iter().enumerate() {
            let sample = (128.0 * (1.0 + value)).floor().clamp(0.0, 255.0);
            self.time[index] = sample as u8;
        }

        for (slot, weight) in self.fft.input.iter_mut().zip(&self.blackman) {
            *slot *= weight;
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let scale = 1.0 / len as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.fft.spectrum[bin].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            let decibels = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let byte = (255.0 / range * (decibels - MIN_DECIBELS)).floor();
            self.frequency[bin] = byte.clamp(0.0, 255.0) as u8;
        }

        self.dirty = false;
        Ok(())
    }

    /// Latest frequency snapshot (`N` bytes, low to high bins).
    pub fn frequency_data(&self) -> &[u8] {
        &self.frequency
    }

    /// Latest time-domain snapshot (`2 × N` bytes, 128 is silence).
    pub fn time_domain_data(&self) -> &[u8] {
        &self.time
    }

    fn rebuild_buffers(&mut self) {
        let len = self.window.time_samples();
        let bins = self.window.frequency_bins();
        self.samples = VecDeque::with_capacity(len);
        self.blackman = (0..len).map(|index| blackman_value(index, len)).collect();
        self.smoothed = vec![0.0; bins];
        self.frequency = vec![0; bins];
        self.time = vec![128; len];
        self.dirty = false;
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        Self {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("window", &self.window)
            .field("smoothing", &self.smoothing)
            .field("buffered", &self.samples.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}
