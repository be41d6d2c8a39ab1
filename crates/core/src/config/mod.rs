use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Result, VizError};

pub const MIN_GAIN: f32 = 0.1;
pub const MAX_GAIN: f32 = 3.0;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub field: FieldConfig,
    pub render: RenderOptions,
    pub canvas: CanvasConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing sections fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: AppConfig = serde_json::from_str(json)?;
        config.render = config.render.with_gain(config.render.gain);
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub window: AnalysisWindow,
    /// Temporal smoothing of spectral magnitudes, clamped to `[0, 1]`.
    pub smoothing: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            window: AnalysisWindow::default(),
            smoothing: 0.7,
        }
    }
}

/// Size of the analysis window. Determines the number of frequency bins
/// (`N`) exposed per snapshot; time-domain snapshots carry `2 × N` samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum AnalysisWindow {
    #[default]
    Bins256,
    Bins512,
    Bins1024,
}

impl AnalysisWindow {
    pub fn frequency_bins(self) -> usize {
        match self {
            Self::Bins256 => 256,
            Self::Bins512 => 512,
            Self::Bins1024 => 1024,
        }
    }

    pub fn time_samples(self) -> usize {
        self.frequency_bins() * 2
    }
}

impl TryFrom<usize> for AnalysisWindow {
    type Error = VizError;

    fn try_from(bins: usize) -> Result<Self> {
        match bins {
            256 => Ok(Self::Bins256),
            512 => Ok(Self::Bins512),
            1024 => Ok(Self::Bins1024),
            _ => Err(VizError::InvalidInput(
                "analysis window must be 256, 512 or 1024 bins",
            )),
        }
    }
}

impl From<AnalysisWindow> for usize {
    fn from(window: AnalysisWindow) -> Self {
        window.frequency_bins()
    }
}

/// Tuning for the particle field simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub particle_count: usize,
    pub max_speed: f32,
    /// Opacity of the dark overlay painted each frame to fade old trails.
    pub trail_alpha: f32,
    pub connection_radius: f32,
    /// Smoothed energy below which connective edges are not drawn.
    pub connection_min_level: f32,
    pub cell_size: f32,
    /// Fixed seed for reproducible runs. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            particle_count: 280,
            max_speed: 2.5,
            trail_alpha: 0.12,
            connection_radius: 90.0,
            connection_min_level: 0.15,
            cell_size: 90.0,
            seed: None,
        }
    }
}

impl FieldConfig {
    /// Returns a copy whose grid cells are at least as large as the
    /// connection radius. Neighbour queries only inspect the surrounding
    /// 3×3 block, so smaller cells would silently drop edges.
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        if !(config.connection_radius.is_finite() && config.connection_radius > 0.0) {
            config.connection_radius = FieldConfig::default().connection_radius;
        }
        if !(config.cell_size.is_finite() && config.cell_size >= config.connection_radius) {
            tracing::warn!(
                cell_size = config.cell_size,
                connection_radius = config.connection_radius,
                "cell size smaller than connection radius, widening grid cells"
            );
            config.cell_size = config.connection_radius;
        }
        if !(config.max_speed.is_finite() && config.max_speed > 0.0) {
            config.max_speed = FieldConfig::default().max_speed;
        }
        config.trail_alpha = config.trail_alpha.clamp(0.0, 1.0);
        config
    }
}

/// Logical canvas configuration used by the application driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            device_pixel_ratio: 1.0,
        }
    }
}

/// Colour treatment shared by all visualisers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    /// Degrees added to every hue.
    pub hue_shift: f32,
    /// Saturation in percent.
    pub saturation: f32,
}

impl Default for Theme {
    fn default() -> Self {
        ThemePreset::Default.theme()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThemePreset {
    #[default]
    Default,
    Neon,
    Monochrome,
}

impl ThemePreset {
    pub const ALL: [ThemePreset; 3] = [Self::Default, Self::Neon, Self::Monochrome];

    /// Resolves a preset by name, falling back to [`ThemePreset::Default`].
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Neon => "neon",
            Self::Monochrome => "monochrome",
        }
    }

    pub fn theme(self) -> Theme {
        match self {
            Self::Default => Theme {
                hue_shift: 0.0,
                saturation: 75.0,
            },
            Self::Neon => Theme {
                hue_shift: 200.0,
                saturation: 95.0,
            },
            Self::Monochrome => Theme {
                hue_shift: 0.0,
                saturation: 0.0,
            },
        }
    }
}

impl FromStr for ThemePreset {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VizError::msg(format!("unknown theme `{s}`")))
    }
}

impl fmt::Display for ThemePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable per-frame options handed to every visualiser draw call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Linear sensitivity applied to all audio features, in `[0.1, 3]`.
    pub gain: f32,
    pub theme: Theme,
    /// Never draw connective edges, whatever the energy.
    pub performance_mode: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            gain: 1.0,
            theme: Theme::default(),
            performance_mode: false,
        }
    }
}

impl RenderOptions {
    /// Returns a copy with `gain` clamped into the supported range.
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = clamp_gain(gain);
        self
    }

    /// Gain as visualisers should apply it. The field is public, so it may
    /// hold anything; out-of-range values are clamped and NaN reads as 1.
    pub fn effective_gain(&self) -> f32 {
        clamp_gain(self.gain)
    }

    pub fn with_theme(mut self, preset: ThemePreset) -> Self {
        self.theme = preset.theme();
        self
    }

    pub fn with_performance_mode(mut self, enabled: bool) -> Self {
        self.performance_mode = enabled;
        self
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_finite() {
        gain.clamp(MIN_GAIN, MAX_GAIN)
    } else {
        1.0
    }
}
