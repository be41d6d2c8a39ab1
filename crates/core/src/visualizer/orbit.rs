use std::f32::consts::TAU;

use glam::Vec2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    analysis,
    config::RenderOptions,
    render::{CanvasSize, Hsla, RenderTarget, Rgba},
    visualizer::{Resizable, VisualizerModule},
    AudioSnapshot, Result,
};

pub const RING_PARTICLES: usize = 120;
const NEUTRAL_BAND: f32 = 0.2;
const TRAIL_ALPHA: f32 = 0.12;
const LIGHTNESS: f32 = 65.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingParticle {
    /// Current angle in radians.
    pub angle: f32,
    /// Fraction of the ring's base radius.
    pub radius: f32,
    pub hue: f32,
    /// Angular speed in radians per frame before twist.
    pub speed: f32,
}

/// Particles circling the canvas centre. Low band breathes the ring, mid
/// twists it, high enlarges the dots.
#[derive(Debug)]
pub struct OrbitRing {
    particles: Vec<RingParticle>,
    size: CanvasSize,
    rng: StdRng,
}

impl OrbitRing {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            particles: Vec::with_capacity(RING_PARTICLES),
            size: CanvasSize::default(),
            rng,
        }
    }

    pub fn particles(&self) -> &[RingParticle] {
        &self.particles
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    fn seed(&mut self) {
        let rng = &mut self.rng;
        self.particles = (0..RING_PARTICLES)
            .map(|i| {
                let fraction = i as f32 / RING_PARTICLES as f32;
                RingParticle {
                    angle: fraction * TAU,
                    radius: 0.3 + rng.random::<f32>() * 0.2,
                    hue: fraction * 360.0,
                    speed: (rng.random::<f32>() - 0.5) * 0.02,
                }
            })
            .collect();
    }
}

impl Resizable for OrbitRing {
    /// Angles and radii are relative to the canvas, so only the first call
    /// has work to do.
    fn resize(&mut self, size: CanvasSize) {
        if !size.is_drawable() {
            return;
        }
        self.size = size;
        if self.particles.is_empty() {
            self.seed();
        }
    }
}

impl VisualizerModule for OrbitRing {
    fn name(&self) -> &'static str {
        "orbit"
    }

    fn draw(
        &mut self,
        target: &mut dyn RenderTarget,
        size: CanvasSize,
        snapshot: &AudioSnapshot<'_>,
        options: &RenderOptions,
    ) -> Result<()> {
        if size != self.size || self.particles.is_empty() {
            self.resize(size);
        }
        if !self.size.is_drawable() {
            return Ok(());
        }

        let gain = options.effective_gain();
        let bands = analysis::extract_bands(snapshot.frequency, gain, NEUTRAL_BAND);
        let theme = options.theme;
        let center = size.center();
        let base_radius = size.width.min(size.height) * 0.32 * (0.85 + bands.low * 0.3);
        let twist = (bands.mid - 0.5) * 2.0 + bands.high * 0.5;

        target.fill_canvas(size, Rgba::rgb8(10, 10, 15).with_alpha(TRAIL_ALPHA))?;

        let dot = 1.5 + bands.high * 3.0;
        let alpha = (0.5 + (bands.low + bands.high) * 0.4).min(1.0);
        for particle in &mut self.particles {
            particle.angle = (particle.angle + particle.speed + twist * 0.02).rem_euclid(TAU);
            let r = base_radius * particle.radius * (1.0 + bands.mid * 0.2);
            let position = center + Vec2::from_angle(particle.angle) * r;
            let hue = (particle.hue + bands.mid * 60.0 + theme.hue_shift).rem_euclid(360.0);
            let color = Hsla::new(hue, theme.saturation, LIGHTNESS, alpha).to_rgba();
            target.fill_circle(position, dot, color)?;
        }
        Ok(())
    }
}
