//! Frame-paced dispatch to the active visualiser.
//!
//! The host calls [`RenderScheduler::tick`] once per display refresh. Each
//! tick either paints the idle background (no audio source attached) or
//! pulls one snapshot from the source and hands it to the active
//! [`VisualizerModule`]. A module failure only costs its own frame: the
//! scheduler paints a flat fallback and keeps going.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    audio::AudioFeatureSource,
    config::RenderOptions,
    render::{CanvasSize, Hsla, RectF, RenderTarget, Rgba},
    visualizer::VisualizerModule,
    Result,
};

/// Frames blended after a visualiser swap.
pub const TRANSITION_FRAMES: u32 = 2;
const TRANSITION_ALPHA: f32 = 0.5;
const IDLE_BAND_AMPLITUDE: f32 = 20.0;
const IDLE_BAND_HEIGHT: f32 = 2.0;
const IDLE_BAND_ALPHA: f32 = 0.04;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// No audio source attached.
    #[default]
    Idle,
    Active,
    /// Blending out the previous visualiser's trail.
    Transitioning { frames_remaining: u32 },
}

/// Monotonic time base for the scheduler, advanced once per tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameClock {
    pub time_seconds: f32,
    pub frames: u64,
}

impl FrameClock {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Non-finite or negative deltas still count a frame but leave the time
    /// untouched.
    pub fn advance(&mut self, delta: f32) {
        if delta.is_finite() && delta > 0.0 {
            self.time_seconds += delta;
        }
        self.frames += 1;
    }
}

/// What a single tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The scheduler is stopped; nothing was painted.
    Skipped,
    Idle,
    Drawn,
    /// The module failed or none was set; a flat background was painted.
    Fallback,
}

/// Running totals of tick outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub idle: u64,
    pub active: u64,
    /// Active frames painted with the transition overlay.
    pub transition: u64,
    pub fallback: u64,
}

impl FrameStats {
    pub fn total(&self) -> u64 {
        self.idle + self.active
    }
}

pub struct RenderScheduler {
    visualizer: Option<Box<dyn VisualizerModule>>,
    size: CanvasSize,
    state: SchedulerState,
    transition_frames: u32,
    clock: FrameClock,
    stats: FrameStats,
    running: bool,
}

impl RenderScheduler {
    pub fn new(size: CanvasSize) -> Self {
        Self {
            visualizer: None,
            size,
            state: SchedulerState::Idle,
            transition_frames: 0,
            clock: FrameClock::default(),
            stats: FrameStats::default(),
            running: false,
        }
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    /// State as of the most recent tick.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn visualizer_name(&self) -> Option<&'static str> {
        self.visualizer.as_deref().map(|module| module.name())
    }

    pub fn start(&mut self) {
        if !self.running {
            tracing::debug!("scheduler started");
            self.running = true;
        }
    }

    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!("scheduler stopped");
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Replaces the active visualiser, hands it the current canvas size and
    /// restarts the transition window. Returns the previous module.
    pub fn set_visualizer(
        &mut self,
        mut module: Box<dyn VisualizerModule>,
    ) -> Option<Box<dyn VisualizerModule>> {
        if self.size.is_drawable() {
            if let Some(resizable) = module.as_resizable() {
                resizable.resize(self.size);
            }
        }
        tracing::debug!(visualizer = module.name(), "visualizer swapped");
        self.transition_frames = TRANSITION_FRAMES;
        self.visualizer.replace(module)
    }

    /// Stores the new canvas size and forwards it to the active module.
    /// Must be called between ticks.
    pub fn resize(&mut self, size: CanvasSize) {
        if !size.is_drawable() {
            tracing::debug!(width = size.width, height = size.height, "ignoring empty resize");
            return;
        }
        self.size = size;
        if let Some(resizable) = self.visualizer.as_mut().and_then(|module| module.as_resizable()) {
            resizable.resize(size);
        }
    }

    /// Runs one frame. Never fails: renderer faults are absorbed here.
    pub fn tick(
        &mut self,
        target: &mut dyn RenderTarget,
        source: &mut dyn AudioFeatureSource,
        options: &RenderOptions,
        delta_seconds: f32,
    ) -> FrameOutcome {
        if !self.running {
            return FrameOutcome::Skipped;
        }
        self.clock.advance(delta_seconds);

        if !source.is_active() {
            self.state = SchedulerState::Idle;
            self.stats.idle += 1;
            if let Err(err) = paint_idle(target, self.size, self.clock.time_seconds) {
                tracing::warn!(error = %err, "idle background failed");
            }
            return FrameOutcome::Idle;
        }

        self.stats.active += 1;
        let snapshot = source.snapshot();

        if self.transition_frames > 0 {
            self.state = SchedulerState::Transitioning {
                frames_remaining: self.transition_frames,
            };
            self.stats.transition += 1;
            self.transition_frames -= 1;
            let overlay = Rgba::rgb8(10, 10, 15).with_alpha(TRANSITION_ALPHA);
            if let Err(err) = target.fill_canvas(self.size, overlay) {
                tracing::warn!(error = %err, "transition overlay failed");
            }
        } else {
            self.state = SchedulerState::Active;
        }

        let drawn = match self.visualizer.as_deref_mut() {
            Some(module) => module
                .draw(target, self.size, &snapshot, options)
                .map_err(|err| {
                    tracing::warn!(visualizer = module.name(), error = %err, "frame failed");
                }),
            None => Err(()),
        };
        if drawn.is_ok() {
            return FrameOutcome::Drawn;
        }

        self.stats.fallback += 1;
        if let Err(err) = target.fill_canvas(self.size, Rgba::rgb8(10, 10, 15)) {
            tracing::warn!(error = %err, "fallback background failed");
        }
        FrameOutcome::Fallback
    }
}

impl fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("visualizer", &self.visualizer_name())
            .field("size", &self.size)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("running", &self.running)
            .finish()
    }
}

/// Dim violet gradient with three slowly drifting bands.
fn paint_idle(target: &mut dyn RenderTarget, size: CanvasSize, time: f32) -> Result<()> {
    let edge = Hsla::new(260.0, 30.0, 8.0, 1.0).to_rgba();
    let middle = Hsla::new(260.0, 25.0, 12.0, 1.0).to_rgba();
    target.fill_linear_gradient(
        size.rect(),
        Vec2::ZERO,
        Vec2::new(size.width, size.height),
        &[(0.0, edge), (0.5, middle), (1.0, edge)],
    )?;

    let band = Rgba::rgb8(255, 255, 255).with_alpha(IDLE_BAND_ALPHA);
    for i in 0..3 {
        let y = size.height / 2.0 + (time + i as f32 * 2.0).sin() * IDLE_BAND_AMPLITUDE;
        target.fill_rect(RectF::new(0.0, y, size.width, IDLE_BAND_HEIGHT), band)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{
        render::{CommandLog, DrawCommand},
        visualizer::Resizable,
        AudioSnapshot, VizError,
    };

    struct FakeSource {
        active: bool,
        frequency: Vec<u8>,
        time: Vec<u8>,
        refreshes: usize,
    }

    impl FakeSource {
        fn new(active: bool) -> Self {
            Self {
                active,
                frequency: vec![100; 64],
                time: vec![128; 128],
                refreshes: 0,
            }
        }
    }

    impl AudioFeatureSource for FakeSource {
        fn refresh(&mut self) {
            self.refreshes += 1;
        }

        fn frequency(&self) -> &[u8] {
            &self.frequency
        }

        fn time_domain(&self) -> &[u8] {
            &self.time
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    #[derive(Default)]
    struct Probe {
        fail: bool,
        draws: usize,
        resized: Rc<Cell<Option<CanvasSize>>>,
    }

    impl Resizable for Probe {
        fn resize(&mut self, size: CanvasSize) {
            self.resized.set(Some(size));
        }
    }

    impl VisualizerModule for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn draw(
            &mut self,
            target: &mut dyn RenderTarget,
            _size: CanvasSize,
            snapshot: &AudioSnapshot<'_>,
            _options: &RenderOptions,
        ) -> Result<()> {
            self.draws += 1;
            if self.fail {
                return Err(VizError::render("probe failure"));
            }
            target.fill_circle(Vec2::ONE, f32::from(snapshot.frequency[0]), Rgba::rgb8(1, 1, 1))
        }

        fn as_resizable(&mut self) -> Option<&mut dyn Resizable> {
            Some(self)
        }
    }

    fn scheduler() -> RenderScheduler {
        let mut scheduler = RenderScheduler::new(CanvasSize::new(80.0, 60.0));
        scheduler.start();
        scheduler
    }

    fn is_overlay(command: &DrawCommand, alpha: f32) -> bool {
        matches!(command, DrawCommand::FillRect { color, .. }
            if *color == Rgba::rgb8(10, 10, 15).with_alpha(alpha))
    }

    #[test]
    fn stopped_scheduler_paints_nothing() {
        let mut scheduler = RenderScheduler::new(CanvasSize::new(10.0, 10.0));
        let mut log = CommandLog::new();
        let mut source = FakeSource::new(true);

        let outcome = scheduler.tick(&mut log, &mut source, &RenderOptions::default(), 0.016);
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(log.commands().is_empty());
        assert_eq!(scheduler.clock().frames, 0);

        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn idle_without_source() {
        let mut scheduler = scheduler();
        scheduler.set_visualizer(Box::<Probe>::default());
        let mut log = CommandLog::new();
        let mut source = FakeSource::new(false);

        let outcome = scheduler.tick(&mut log, &mut source, &RenderOptions::default(), 0.016);
        assert_eq!(outcome, FrameOutcome::Idle);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(source.refreshes, 0);

        let commands = log.commands();
        assert_eq!(commands.len(), 4);
        assert!(matches!(
            &commands[0],
            DrawCommand::FillGradient { stops, .. } if stops.len() == 3
        ));
        for command in &commands[1..] {
            let DrawCommand::FillRect { rect, .. } = command else {
                panic!("expected band, got {command:?}");
            };
            assert_eq!(rect.height, IDLE_BAND_HEIGHT);
            assert!((rect.y - 30.0).abs() <= IDLE_BAND_AMPLITUDE);
        }
    }

    #[test]
    fn swap_blends_two_frames() {
        let mut scheduler = scheduler();
        let mut log = CommandLog::new();
        let mut source = FakeSource::new(true);
        let options = RenderOptions::default();

        assert!(scheduler.set_visualizer(Box::<Probe>::default()).is_none());
        for remaining in [2, 1] {
            log.clear();
            assert_eq!(scheduler.tick(&mut log, &mut source, &options, 0.016), FrameOutcome::Drawn);
            assert_eq!(
                scheduler.state(),
                SchedulerState::Transitioning {
                    frames_remaining: remaining
                }
            );
            assert!(is_overlay(&log.commands()[0], TRANSITION_ALPHA));
            assert_eq!(log.circles(), 1);
        }

        log.clear();
        scheduler.tick(&mut log, &mut source, &options, 0.016);
        assert_eq!(scheduler.state(), SchedulerState::Active);
        assert_eq!(log.commands().len(), 1);
        assert_eq!(log.circles(), 1);

        let stats = scheduler.stats();
        assert_eq!((stats.active, stats.transition, stats.fallback), (3, 2, 0));
    }

    #[test]
    fn failed_frame_paints_fallback_and_continues() {
        let mut scheduler = scheduler();
        let mut log = CommandLog::new();
        let mut source = FakeSource::new(true);
        let options = RenderOptions::default();
        scheduler.set_visualizer(Box::new(Probe {
            fail: true,
            ..Probe::default()
        }));

        for _ in 0..3 {
            log.clear();
            let outcome = scheduler.tick(&mut log, &mut source, &options, 0.016);
            assert_eq!(outcome, FrameOutcome::Fallback);
            assert!(is_overlay(log.commands().last().unwrap(), 1.0));
        }
        assert!(scheduler.is_running());
        assert_eq!(scheduler.stats().fallback, 3);
    }

    #[test]
    fn missing_module_falls_back() {
        let mut scheduler = scheduler();
        let mut log = CommandLog::new();
        let mut source = FakeSource::new(true);

        let outcome = scheduler.tick(&mut log, &mut source, &RenderOptions::default(), 0.016);
        assert_eq!(outcome, FrameOutcome::Fallback);
        assert_eq!(log.commands().len(), 1);
    }

    #[test]
    fn resize_reaches_active_module() {
        let mut scheduler = scheduler();
        let first = Probe::default();
        let seen = Rc::clone(&first.resized);
        scheduler.set_visualizer(Box::new(first));
        assert_eq!(seen.get(), Some(CanvasSize::new(80.0, 60.0)));

        scheduler.resize(CanvasSize::new(0.0, 10.0));
        assert_eq!(scheduler.size(), CanvasSize::new(80.0, 60.0));
        scheduler.resize(CanvasSize::new(320.0, 200.0));
        assert_eq!(seen.get(), Some(CanvasSize::new(320.0, 200.0)));

        let second = Probe::default();
        let seen_second = Rc::clone(&second.resized);
        let previous = scheduler.set_visualizer(Box::new(second));
        assert!(previous.is_some());
        assert_eq!(seen_second.get(), Some(CanvasSize::new(320.0, 200.0)));
        assert_eq!(scheduler.visualizer_name(), Some("probe"));
    }

    #[test]
    fn clock_ignores_bad_deltas() {
        let mut clock = FrameClock::default();
        clock.advance(0.5);
        clock.advance(f32::NAN);
        clock.advance(-1.0);
        assert_eq!(clock.time_seconds, 0.5);
        assert_eq!(clock.frames, 3);
        clock.reset();
        assert_eq!(clock, FrameClock::default());
    }
}
