//! Audio-driven particle field with trails and proximity edges.
//!
//! Each frame the field:
//!
//! 1. feeds the snapshot energy into its [`BeatDetector`],
//! 2. derives low/mid/high bands and the waveform pulse,
//! 3. accumulates swirl, centering, jitter, sway and beat-burst forces on
//!    every particle, clamps speed and bounces off the canvas edges,
//! 4. rebuilds the [`SpatialGrid`] from the new positions,
//! 5. fades the previous frame, draws the particles and, while the field is
//!    loud enough, the edges between nearby particles.

pub mod grid;

use glam::Vec2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    analysis::{self, BeatDetector, BeatState, Bands},
    config::{FieldConfig, RenderOptions},
    render::{CanvasSize, Hsla, RenderTarget, Rgba},
    AudioSnapshot, Result,
};

pub use grid::{GridPoint, Neighbor, SpatialGrid};

/// Band estimate used when the snapshot is too short to split.
const NEUTRAL_BAND: f32 = 0.3;
const BOUNCE: f32 = -0.8;
const BURST_THRESHOLD: f32 = 0.1;
const CENTERING: f32 = 0.0002;
const SWAY_FREQUENCY: f32 = 0.02;
const SWAY_SCALE: f32 = 0.05;
const MIN_CENTER_DISTANCE: f32 = 0.001;
const LIGHTNESS: f32 = 65.0;
const EDGE_HUE: f32 = 200.0;
const EDGE_WIDTH: f32 = 0.8;

/// One particle. Its identity is its index in the owning field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub base_size: f32,
    /// Base hue in degrees, `[0, 360)`.
    pub hue: f32,
}

impl GridPoint for Particle {
    fn position(&self) -> Vec2 {
        self.position
    }
}

/// Audio features the field derived for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldFrame {
    /// Mean normalised magnitude scaled by gain.
    pub energy: f32,
    pub bands: Bands,
    pub wave_pulse: f32,
    pub beat: BeatState,
    /// Connective edges drawn, zero when edges were skipped.
    pub edges: usize,
}

/// Per-frame force magnitudes, derived once from the frame features.
#[derive(Debug, Clone, Copy)]
struct Forces {
    center: Vec2,
    pull_scale: f32,
    orbit: f32,
    spread: f32,
    jitter: f32,
    sway: f32,
    burst: f32,
}

impl Forces {
    fn new(size: CanvasSize, gain: f32, bands: Bands, beat: BeatState) -> Self {
        Self {
            center: size.center(),
            pull_scale: gain * (0.5 + beat.smoothed_energy * 1.5),
            orbit: bands.low * 0.015 * (1.0 + bands.low),
            spread: 0.3 + bands.mid * 0.4,
            jitter: bands.high * 2.5,
            sway: bands.mid * 0.8,
            burst: beat.impulse * 12.0,
        }
    }
}

/// Fixed-size particle simulation owning its grid, beat tracker and RNG.
#[derive(Debug)]
pub struct ParticleField {
    config: FieldConfig,
    particles: Vec<Particle>,
    grid: SpatialGrid,
    beat: BeatDetector,
    size: CanvasSize,
    rng: StdRng,
    last_frame: FieldFrame,
}

impl ParticleField {
    pub fn new(config: &FieldConfig) -> Self {
        let config = config.normalized();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            grid: SpatialGrid::new(config.cell_size),
            particles: Vec::with_capacity(config.particle_count),
            beat: BeatDetector::new(),
            size: CanvasSize::default(),
            last_frame: FieldFrame::default(),
            config,
            rng,
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn beat(&self) -> BeatState {
        self.beat.state()
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    /// Features and edge count of the most recent frame.
    pub fn last_frame(&self) -> FieldFrame {
        self.last_frame
    }

    /// Adopts new canvas bounds. The first call seeds the particles; later
    /// calls clamp existing positions into the new bounds.
    pub fn resize(&mut self, size: CanvasSize) {
        if !size.is_drawable() {
            return;
        }

        self.size = size;
        if self.particles.is_empty() {
            self.seed_particles();
        } else {
            for particle in &mut self.particles {
                particle.position = clamp_to(particle.position, size);
            }
        }
        self.grid.rebuild(&self.particles, self.config.cell_size);
        tracing::debug!(
            width = size.width,
            height = size.height,
            particles = self.particles.len(),
            "particle field resized"
        );
    }

    /// Runs the simulation for one frame without drawing anything.
    pub fn step(&mut self, snapshot: &AudioSnapshot<'_>, options: &RenderOptions) -> FieldFrame {
        let gain = options.effective_gain();
        let frequency = snapshot.frequency;

        let energy = analysis::mean_energy(frequency, gain);
        self.beat.update(energy);
        let beat = self.beat.state();
        let bands = analysis::extract_bands(frequency, gain, NEUTRAL_BAND);
        let wave_pulse = analysis::wave_pulse(snapshot.time);

        let forces = Forces::new(self.size, gain, bands, beat);
        let size = self.size;
        let max_speed = self.config.max_speed;
        for particle in &mut self.particles {
            let pull = bin_level(frequency, particle.position.x, size.width) * forces.pull_scale;
            apply_forces(particle, &forces, pull, &mut self.rng);
            integrate(particle, size, max_speed);
        }

        self.grid.rebuild(&self.particles, self.config.cell_size);

        FieldFrame {
            energy,
            bands,
            wave_pulse,
            beat,
            edges: 0,
        }
    }

    /// Paints the trail fade, the particles and, when loud enough, the
    /// proximity edges. Returns the number of edges drawn.
    pub fn render(
        &self,
        target: &mut dyn RenderTarget,
        snapshot: &AudioSnapshot<'_>,
        options: &RenderOptions,
        frame: &FieldFrame,
    ) -> Result<usize> {
        let gain = options.effective_gain();
        let theme = options.theme;
        let average = frame.beat.smoothed_energy;

        target.fill_canvas(
            self.size,
            Rgba::rgb8(10, 10, 15).with_alpha(self.config.trail_alpha),
        )?;

        for particle in &self.particles {
            let level =
                bin_level(snapshot.frequency, particle.position.x, self.size.width) * gain;
            let radius = particle.base_size * (0.8 + (level + frame.wave_pulse) * 0.6);
            let alpha = (0.4 + level * 0.5 + frame.wave_pulse * 0.2).min(1.0);
            let hue = (particle.hue + average * 60.0 + theme.hue_shift).rem_euclid(360.0);
            let color = Hsla::new(hue, theme.saturation, LIGHTNESS, alpha).to_rgba();
            target.fill_circle(particle.position, radius, color)?;
        }

        if options.performance_mode || average <= self.config.connection_min_level {
            return Ok(0);
        }

        let edge_hue = (EDGE_HUE + theme.hue_shift).rem_euclid(360.0);
        let radius = self.config.connection_radius;
        let mut edges = 0;
        for (index, particle) in self.particles.iter().enumerate() {
            let mut result = Ok(());
            self.grid
                .for_each_neighbor(&self.particles, index, radius, |neighbor| {
                    // Each unordered pair is visited from both ends; draw it
                    // from the lower index only.
                    if neighbor.index <= index || result.is_err() {
                        return;
                    }
                    let alpha = (1.0 - neighbor.distance / radius) * average * 0.5;
                    let color = Hsla::new(edge_hue, theme.saturation, LIGHTNESS, alpha).to_rgba();
                    result = target.stroke_line(
                        particle.position,
                        self.particles[neighbor.index].position,
                        EDGE_WIDTH,
                        color,
                    );
                    edges += 1;
                });
            result?;
        }

        Ok(edges)
    }

    /// Simulates and draws one frame onto `target`.
    pub fn draw(
        &mut self,
        target: &mut dyn RenderTarget,
        size: CanvasSize,
        snapshot: &AudioSnapshot<'_>,
        options: &RenderOptions,
    ) -> Result<FieldFrame> {
        if size != self.size || self.particles.is_empty() {
            self.resize(size);
        }
        if !self.size.is_drawable() {
            return Ok(FieldFrame::default());
        }

        let mut frame = self.step(snapshot, options);
        frame.edges = self.render(target, snapshot, options, &frame)?;
        self.last_frame = frame;
        tracing::trace!(
            energy = frame.energy,
            impulse = frame.beat.impulse,
            edges = frame.edges,
            "particle frame"
        );
        Ok(frame)
    }

    fn seed_particles(&mut self) {
        let size = self.size;
        let rng = &mut self.rng;
        self.particles = (0..self.config.particle_count)
            .map(|_| Particle {
                position: Vec2::new(
                    rng.random::<f32>() * size.width,
                    rng.random::<f32>() * size.height,
                ),
                velocity: Vec2::new(
                    (rng.random::<f32>() - 0.5) * 2.0,
                    (rng.random::<f32>() - 0.5) * 2.0,
                ),
                base_size: 0.5 + rng.random::<f32>() * 1.5,
                hue: rng.random::<f32>() * 360.0,
            })
            .collect();
    }
}

fn apply_forces(particle: &mut Particle, forces: &Forces, pull: f32, rng: &mut StdRng) {
    let offset = particle.position - forces.center;
    let distance = offset.length().max(MIN_CENTER_DISTANCE);
    let radial = offset / distance;

    // Swirl around the centre, driven by the bass.
    particle.velocity += radial.perp() * forces.orbit;
    // Loud bins under the particle draw it back toward the centre.
    particle.velocity -= offset * CENTERING * pull;

    let mut spread = || {
        (rng.random::<f32>() - 0.5) * forces.spread + (rng.random::<f32>() - 0.5) * forces.jitter
    };
    particle.velocity += Vec2::new(spread(), spread());

    particle.velocity += Vec2::new(
        (particle.position.y * SWAY_FREQUENCY).sin(),
        (particle.position.x * SWAY_FREQUENCY).cos(),
    ) * forces.sway
        * SWAY_SCALE;

    if forces.burst > BURST_THRESHOLD {
        particle.velocity += radial * forces.burst;
    }
}

fn integrate(particle: &mut Particle, size: CanvasSize, max_speed: f32) {
    if !particle.velocity.is_finite() {
        particle.velocity = Vec2::ZERO;
    }
    particle.velocity = particle.velocity.clamp_length_max(max_speed);
    particle.position += particle.velocity;
    if !particle.position.is_finite() {
        particle.position = size.center();
    }

    if particle.position.x < 0.0 || particle.position.x > size.width {
        particle.velocity.x *= BOUNCE;
    }
    if particle.position.y < 0.0 || particle.position.y > size.height {
        particle.velocity.y *= BOUNCE;
    }
    particle.position = clamp_to(particle.position, size);
}

fn clamp_to(position: Vec2, size: CanvasSize) -> Vec2 {
    Vec2::new(
        position.x.clamp(0.0, size.width),
        position.y.clamp(0.0, size.height),
    )
}

/// Normalised magnitude of the bin under horizontal position `x`.
fn bin_level(frequency: &[u8], x: f32, width: f32) -> f32 {
    if frequency.is_empty() || width <= 0.0 {
        return 0.0;
    }
    let last = frequency.len() - 1;
    let bin = ((x / width) * frequency.len() as f32).floor();
    let bin = if bin.is_finite() { (bin.max(0.0) as usize).min(last) } else { 0 };
    analysis::level(frequency[bin])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::CommandLog;
    use proptest::prelude::*;

    fn field(count: usize) -> ParticleField {
        ParticleField::new(&FieldConfig {
            particle_count: count,
            seed: Some(7),
            ..FieldConfig::default()
        })
    }

    fn within(size: CanvasSize, particle: &Particle) -> bool {
        (0.0..=size.width).contains(&particle.position.x)
            && (0.0..=size.height).contains(&particle.position.y)
    }

    #[test]
    fn first_resize_seeds_particles_inside_bounds() {
        let mut field = field(280);
        let size = CanvasSize::new(800.0, 600.0);
        field.resize(size);

        assert_eq!(field.particles().len(), 280);
        assert!(field.particles().iter().all(|p| within(size, p)));
        assert!(field.particles().iter().all(|p| (0.5..2.0).contains(&p.base_size)));
        assert!(field.particles().iter().all(|p| (0.0..360.0).contains(&p.hue)));
    }

    #[test]
    fn shrinking_clamps_and_repeat_resize_is_idempotent() {
        let mut field = field(100);
        field.resize(CanvasSize::new(800.0, 600.0));
        let small = CanvasSize::new(200.0, 100.0);
        field.resize(small);
        assert!(field.particles().iter().all(|p| within(small, p)));

        let before = field.particles().to_vec();
        field.resize(small);
        assert_eq!(field.particles(), before.as_slice());
    }

    #[test]
    fn undrawable_sizes_are_ignored() {
        let mut field = field(10);
        field.resize(CanvasSize::new(0.0, 100.0));
        assert!(field.particles().is_empty());

        let mut log = CommandLog::new();
        let frame = field
            .draw(
                &mut log,
                CanvasSize::new(f32::NAN, 10.0),
                &AudioSnapshot::new(&[0; 16], &[128; 32]),
                &RenderOptions::default(),
            )
            .unwrap();
        assert_eq!(frame, FieldFrame::default());
        assert!(log.commands().is_empty());
    }

    #[test]
    fn same_seed_gives_same_simulation() {
        let size = CanvasSize::new(320.0, 240.0);
        let frequency = [180u8; 64];
        let time = [140u8; 128];
        let snapshot = AudioSnapshot::new(&frequency, &time);
        let options = RenderOptions::default();

        let mut a = field(50);
        let mut b = field(50);
        for _ in 0..10 {
            a.draw(&mut CommandLog::new(), size, &snapshot, &options).unwrap();
            b.draw(&mut CommandLog::new(), size, &snapshot, &options).unwrap();
        }
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn speed_never_exceeds_limit() {
        let mut field = field(120);
        let size = CanvasSize::new(400.0, 300.0);
        let loud = [255u8; 256];
        let time: Vec<u8> = (0..512).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect();
        for _ in 0..30 {
            let snapshot = AudioSnapshot::new(&loud, &time);
            let options = RenderOptions::default().with_gain(3.0);
            field
                .draw(&mut CommandLog::new(), size, &snapshot, &options)
                .unwrap();
            assert!(field
                .particles()
                .iter()
                .all(|p| p.velocity.length() <= field.config().max_speed * 1.0001));
        }
    }

    #[test]
    fn loud_onset_pushes_particles_outward() {
        let mut field = field(200);
        let size = CanvasSize::new(800.0, 600.0);
        field.resize(size);
        let center = size.center();
        let before: f32 = field
            .particles()
            .iter()
            .map(|p| p.position.distance(center))
            .sum();

        let frame = field.step(
            &AudioSnapshot::new(&[255; 256], &[128; 512]),
            &RenderOptions::default(),
        );
        assert!(frame.beat.impulse > 0.0);
        assert_eq!(frame.bands.clamped(), Bands::splat(1.0));
        let after: f32 = field
            .particles()
            .iter()
            .map(|p| p.position.distance(center))
            .sum();
        assert!(after > before);
        // Burst saturates the speed limit for particles not pinned to a wall.
        let saturated = field
            .particles()
            .iter()
            .filter(|p| (p.velocity.length() - 2.5).abs() < 1e-3)
            .count();
        assert!(saturated > 150);
    }

    #[test]
    fn short_snapshots_degrade_gracefully() {
        let mut field = field(30);
        let mut log = CommandLog::new();
        let frame = field
            .draw(
                &mut log,
                CanvasSize::new(100.0, 100.0),
                &AudioSnapshot::new(&[], &[]),
                &RenderOptions::default(),
            )
            .unwrap();

        assert_eq!(frame.bands, Bands::splat(NEUTRAL_BAND));
        assert_eq!(frame.energy, 0.0);
        assert_eq!(frame.wave_pulse, 0.0);
        assert_eq!(log.circles(), 30);
    }

    #[test]
    fn quiet_field_draws_no_edges() {
        let mut field = field(280);
        let mut log = CommandLog::new();
        let frame = field
            .draw(
                &mut log,
                CanvasSize::new(800.0, 600.0),
                &AudioSnapshot::new(&[0; 256], &[128; 512]),
                &RenderOptions::default(),
            )
            .unwrap();
        assert_eq!(frame.edges, 0);
        assert_eq!(log.lines(), 0);
        assert_eq!(log.circles(), 280);
    }

    #[test]
    fn loud_field_draws_each_edge_once() {
        let mut field = field(150);
        let size = CanvasSize::new(300.0, 300.0);
        field.resize(size);
        let loud = [255u8; 256];
        let snapshot = AudioSnapshot::new(&loud, &[128; 512]);
        let options = RenderOptions::default();
        // Build up smoothed energy past the visibility threshold.
        for _ in 0..5 {
            field.step(&snapshot, &options);
        }

        let mut frame = field.step(&snapshot, &options);
        assert_eq!(field.grid().len(), 150);
        assert!(frame.beat.smoothed_energy > field.config().connection_min_level);
        let mut log = CommandLog::new();
        frame.edges = field.render(&mut log, &snapshot, &options, &frame).unwrap();

        let radius = field.config().connection_radius;
        let points = field.particles();
        let mut expected = 0;
        for i in 0..points.len() {
            for j in i + 1..points.len() {
                if points[i].position.distance(points[j].position) < radius {
                    expected += 1;
                }
            }
        }
        assert!(expected > 0);
        assert_eq!(frame.edges, expected);
        assert_eq!(log.lines(), expected);
    }

    #[test]
    fn performance_mode_skips_edges() {
        let mut field = field(150);
        let size = CanvasSize::new(300.0, 300.0);
        let loud = [255u8; 256];
        let snapshot = AudioSnapshot::new(&loud, &[128; 512]);
        let options = RenderOptions::default().with_performance_mode(true);
        for _ in 0..6 {
            field.draw(&mut CommandLog::new(), size, &snapshot, &options).unwrap();
        }
        assert!(field.beat().smoothed_energy > field.config().connection_min_level);
        assert_eq!(field.last_frame().edges, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn particles_never_escape(
            frames in proptest::collection::vec(
                (
                    proptest::collection::vec(any::<u8>(), 0..300),
                    proptest::collection::vec(any::<u8>(), 0..600),
                ),
                1..40,
            ),
            width in 1.0f32..900.0,
            height in 1.0f32..700.0,
            gain in 0.1f32..3.0,
        ) {
            let mut field = field(60);
            let size = CanvasSize::new(width, height);
            let options = RenderOptions::default().with_gain(gain);
            for (frequency, time) in &frames {
                let snapshot = AudioSnapshot::new(frequency, time);
                field.draw(&mut CommandLog::new(), size, &snapshot, &options).unwrap();
                for particle in field.particles() {
                    prop_assert!(particle.position.is_finite() && particle.velocity.is_finite());
                    prop_assert!(within(size, particle));
                }
            }
        }
    }
}
