use std::f32::consts::TAU;

use crate::{config::AudioConfig, AnalysisWindow, Analyser, Result, VizError};

/// Amplitude of the built-in demo tone.
const DEMO_AMPLITUDE: f32 = 0.15;
/// Pitches of the demo tone, each held for [`DEMO_STEP_SECONDS`].
const DEMO_PITCHES: [f32; 4] = [220.0, 440.0, 330.0, 220.0];
const DEMO_STEP_SECONDS: f32 = 0.5;
const DEMO_CYCLE_SECONDS: f32 = DEMO_STEP_SECONDS * DEMO_PITCHES.len() as f32;

/// Byte snapshot of the audio at one frame.
///
/// Borrowed from the source and only valid for the duration of a draw call;
/// the source overwrites its buffers on the next refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSnapshot<'a> {
    /// Frequency magnitudes, low to high bin.
    pub frequency: &'a [u8],
    /// Waveform amplitudes, 128 is the zero crossing.
    pub time: &'a [u8],
}

impl<'a> AudioSnapshot<'a> {
    pub fn new(frequency: &'a [u8], time: &'a [u8]) -> Self {
        Self { frequency, time }
    }
}

/// Anything that can hand out per-frame audio snapshots.
pub trait AudioFeatureSource {
    /// Brings both snapshots up to date with the latest audio.
    fn refresh(&mut self);

    /// Frequency snapshot as of the last refresh.
    fn frequency(&self) -> &[u8];

    /// Time-domain snapshot as of the last refresh.
    fn time_domain(&self) -> &[u8];

    /// True once a file, microphone or demo source has been attached.
    fn is_active(&self) -> bool;

    fn current_frequency_snapshot(&mut self) -> &[u8] {
        self.refresh();
        self.frequency()
    }

    fn current_time_domain_snapshot(&mut self) -> &[u8] {
        self.refresh();
        self.time_domain()
    }

    /// Refreshes once and borrows both snapshots together.
    fn snapshot(&mut self) -> AudioSnapshot<'_> {
        self.refresh();
        let this = &*self;
        AudioSnapshot::new(this.frequency(), this.time_domain())
    }
}

/// Where the samples feeding an [`AnalyserSource`] come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Decoded file playback, pushed in by the host.
    File,
    /// Live capture, pushed in by the host.
    Microphone,
    /// The built-in stepped sine tone.
    Demo,
}

/// Ticket for one asynchronous source acquisition. Only the most recently
/// issued ticket may attach a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceRequest(u64);

/// [`AudioFeatureSource`] backed by the spectral [`Analyser`].
///
/// File decoding and microphone capture live outside the core: the host
/// acquires the stream, attaches it here and keeps pushing samples.
#[derive(Debug)]
pub struct AnalyserSource {
    analyser: Analyser,
    sample_rate: u32,
    attached: Option<SourceKind>,
    demo: DemoTone,
    latest_request: u64,
}

impl AnalyserSource {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            analyser: Analyser::new(config),
            sample_rate: config.sample_rate.max(1),
            attached: None,
            demo: DemoTone::default(),
            latest_request: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn attached(&self) -> Option<SourceKind> {
        self.attached
    }

    pub fn analyser(&self) -> &Analyser {
        &self.analyser
    }

    pub fn set_window(&mut self, window: AnalysisWindow) {
        self.analyser.set_window(window);
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.analyser.set_smoothing(smoothing);
    }

    /// Attaches a source immediately, replacing whatever was attached.
    pub fn attach(&mut self, kind: SourceKind) {
        if self.attached.is_some() {
            self.detach();
        }
        if kind == SourceKind::Demo {
            self.demo = DemoTone::default();
        }
        tracing::info!(?kind, "audio source attached");
        self.attached = Some(kind);
    }

    /// Detaches the current source and silences the analyser.
    pub fn detach(&mut self) {
        if let Some(kind) = self.attached.take() {
            tracing::info!(?kind, "audio source detached");
            self.analyser.reset();
        }
    }

    /// Starts an asynchronous acquisition. Any request issued earlier is
    /// superseded.
    pub fn begin_request(&mut self) -> SourceRequest {
        self.latest_request += 1;
        SourceRequest(self.latest_request)
    }

    /// Completes an acquisition started with [`begin_request`](Self::begin_request).
    ///
    /// Returns `Ok(false)` without touching state when a newer request has
    /// been issued since. A failed acquisition detaches the previous source
    /// and is reported back to the caller.
    pub fn complete_request(
        &mut self,
        request: SourceRequest,
        outcome: Result<SourceKind>,
    ) -> Result<bool> {
        if request.0 != self.latest_request {
            tracing::debug!(?request, "ignoring superseded source request");
            return Ok(false);
        }

        match outcome {
            Ok(kind) => {
                self.attach(kind);
                Ok(true)
            }
            Err(err) => {
                self.detach();
                tracing::warn!(error = %err, "audio source acquisition failed");
                Err(match err {
                    VizError::SourceUnavailable(_) => err,
                    other => VizError::SourceUnavailable(other.to_string()),
                })
            }
        }
    }

    /// Feeds mono samples from an attached file or microphone stream.
    /// Samples arriving while nothing is attached are dropped.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if self.attached.is_some() {
            self.analyser.push_samples(samples);
        }
    }

    /// Advances the demo tone by `seconds` of audio. No-op for other sources.
    pub fn advance(&mut self, seconds: f32) {
        if self.attached != Some(SourceKind::Demo) || seconds.is_nan() || seconds <= 0.0 {
            return;
        }

        let count = (seconds * self.sample_rate as f32).round() as usize;
        let count = count.min(self.analyser.window().time_samples() * 4);
        let samples = self.demo.render(count, self.sample_rate);
        self.analyser.push_samples(&samples);
    }
}

impl AudioFeatureSource for AnalyserSource {
    fn refresh(&mut self) {
        if let Err(err) = self.analyser.refresh() {
            tracing::warn!(error = %err, "spectral refresh failed, reusing previous snapshot");
        }
    }

    fn frequency(&self) -> &[u8] {
        self.analyser.frequency_data()
    }

    fn time_domain(&self) -> &[u8] {
        self.analyser.time_domain_data()
    }

    fn is_active(&self) -> bool {
        self.attached.is_some()
    }
}

/// Stepped sine oscillator used when no real audio is available.
#[derive(Debug, Clone, Default)]
struct DemoTone {
    elapsed: f32,
    phase: f32,
}

impl DemoTone {
    fn pitch_at(seconds: f32) -> f32 {
        let step = (seconds.rem_euclid(DEMO_CYCLE_SECONDS) / DEMO_STEP_SECONDS) as usize;
        DEMO_PITCHES[step.min(DEMO_PITCHES.len() - 1)]
    }

    fn render(&mut self, count: usize, sample_rate: u32) -> Vec<f32> {
        let dt = 1.0 / sample_rate as f32;
        (0..count)
            .map(|_| {
                let pitch = Self::pitch_at(self.elapsed);
                let sample = DEMO_AMPLITUDE * self.phase.sin();
                self.phase = (self.phase + TAU * pitch * dt) % TAU;
                // Kept within one cycle so f32 precision never stalls it.
                self.elapsed = (self.elapsed + dt).rem_euclid(DEMO_CYCLE_SECONDS);
                sample
            })
            .collect()
    }
}
