//! Core library for the pulsefield audio-reactive renderer.
//!
//! An [`AudioFeatureSource`] produces one frequency and one time-domain byte
//! snapshot per frame. The [`RenderScheduler`] pulls those snapshots at the
//! host's frame rate and dispatches them to the active visualiser, painting
//! an idle background while no source is attached. [`ParticleField`] is the
//! main visualiser: a beat-reactive particle simulation whose proximity edges
//! are found through a [`SpatialGrid`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod particles;
pub mod render;
pub mod scheduler;
pub mod visualizer;

pub use analysis::{Analyser, Bands, BeatDetector, BeatState};
pub use audio::{AnalyserSource, AudioFeatureSource, AudioSnapshot, SourceKind, SourceRequest};
pub use config::{
    AnalysisWindow, AppConfig, AudioConfig, CanvasConfig, FieldConfig, RenderOptions, Theme,
    ThemePreset,
};
pub use error::{Result, VizError};
pub use particles::{FieldFrame, Particle, ParticleField, SpatialGrid};
pub use render::{CanvasSize, CommandLog, Raster, RenderTarget, Rgba};
pub use scheduler::{FrameOutcome, FrameStats, RenderScheduler, SchedulerState};
pub use visualizer::{OrbitRing, Resizable, Visualizer, VisualizerKind, VisualizerModule};
