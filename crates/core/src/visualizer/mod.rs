//! Pluggable renderers driven by the scheduler.

pub mod orbit;

use std::{fmt, str::FromStr};

use crate::{
    config::{FieldConfig, RenderOptions},
    particles::ParticleField,
    render::{CanvasSize, RenderTarget},
    AudioSnapshot, Result, VizError,
};

pub use orbit::OrbitRing;

/// Contract every renderer fulfils.
///
/// `draw` must not keep the snapshot slices; they are overwritten before the
/// next frame. An `Err` marks this frame as failed and the scheduler paints a
/// fallback instead.
pub trait VisualizerModule {
    fn name(&self) -> &'static str;

    fn draw(
        &mut self,
        target: &mut dyn RenderTarget,
        size: CanvasSize,
        snapshot: &AudioSnapshot<'_>,
        options: &RenderOptions,
    ) -> Result<()>;

    /// Exposes the resize hook of modules that keep size-dependent state.
    fn as_resizable(&mut self) -> Option<&mut dyn Resizable> {
        None
    }
}

/// Optional capability: react to canvas size changes between frames.
pub trait Resizable {
    fn resize(&mut self, size: CanvasSize);
}

impl Resizable for ParticleField {
    fn resize(&mut self, size: CanvasSize) {
        ParticleField::resize(self, size);
    }
}

/// The built-in renderers.
#[derive(Debug)]
pub enum Visualizer {
    Particles(ParticleField),
    Orbit(OrbitRing),
}

impl Visualizer {
    pub fn kind(&self) -> VisualizerKind {
        match self {
            Self::Particles(_) => VisualizerKind::Particles,
            Self::Orbit(_) => VisualizerKind::Orbit,
        }
    }
}

impl VisualizerModule for Visualizer {
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn draw(
        &mut self,
        target: &mut dyn RenderTarget,
        size: CanvasSize,
        snapshot: &AudioSnapshot<'_>,
        options: &RenderOptions,
    ) -> Result<()> {
        match self {
            Self::Particles(field) => field.draw(target, size, snapshot, options).map(|_| ()),
            Self::Orbit(ring) => ring.draw(target, size, snapshot, options),
        }
    }

    fn as_resizable(&mut self) -> Option<&mut dyn Resizable> {
        match self {
            Self::Particles(field) => Some(field),
            Self::Orbit(ring) => Some(ring),
        }
    }
}

/// Name-addressable registry of the built-in renderers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VisualizerKind {
    #[default]
    Particles,
    Orbit,
}

impl VisualizerKind {
    pub const ALL: [VisualizerKind; 2] = [Self::Particles, Self::Orbit];

    /// Resolves a mode name, falling back to [`VisualizerKind::Particles`].
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Particles => "particles",
            Self::Orbit => "orbit",
        }
    }

    /// Creates a fresh renderer instance.
    pub fn build(self, config: &FieldConfig) -> Visualizer {
        match self {
            Self::Particles => Visualizer::Particles(ParticleField::new(config)),
            Self::Orbit => Visualizer::Orbit(OrbitRing::new(config.seed)),
        }
    }

    /// The kind after this one, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|&kind| kind == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl FromStr for VisualizerKind {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VizError::msg(format!("unknown visualizer `{s}`")))
    }
}

impl fmt::Display for VisualizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
