//! Drawing surface abstraction and its implementations.
//!
//! Visualisers only ever talk to [`RenderTarget`]. [`Raster`] draws into a
//! `tiny-skia` pixmap for real output, [`CommandLog`] just records what was
//! asked of it.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tiny_skia::{
    Color, FillRule, GradientStop, LinearGradient, Paint, PathBuilder, Pixmap, Point, Rect,
    SpreadMode, Stroke, Transform,
};

use crate::{Result, VizError};

/// Highest device pixel ratio honoured by [`Raster`].
pub const MAX_DEVICE_PIXEL_RATIO: f32 = 2.0;

/// Logical canvas dimensions in CSS-style pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

impl CanvasSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// True when both sides are finite and strictly positive.
    pub fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn rect(&self) -> RectF {
        RectF::new(0.0, 0.0, self.width, self.height)
    }
}

/// Axis-aligned rectangle in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|value| value.is_finite())
    }
}

/// Straight-alpha colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            1.0,
        )
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    fn to_skia(self) -> Result<Color> {
        let [r, g, b, a] = [self.r, self.g, self.b, self.a];
        if ![r, g, b, a].iter().all(|c| c.is_finite()) {
            return Err(VizError::render("non-finite colour component"));
        }
        Color::from_rgba(
            r.clamp(0.0, 1.0),
            g.clamp(0.0, 1.0),
            b.clamp(0.0, 1.0),
            a.clamp(0.0, 1.0),
        )
        .ok_or_else(|| VizError::render("colour out of range"))
    }
}

/// Hue in degrees, saturation and lightness in percent, alpha in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsla {
    pub h: f32,
    pub s: f32,
    pub l: f32,
    pub a: f32,
}

impl Hsla {
    pub fn new(h: f32, s: f32, l: f32, a: f32) -> Self {
        Self { h, s, l, a }
    }

    pub fn to_rgba(self) -> Rgba {
        let h = self.h.rem_euclid(360.0) / 360.0;
        let s = (self.s / 100.0).clamp(0.0, 1.0);
        let l = (self.l / 100.0).clamp(0.0, 1.0);

        if s == 0.0 {
            return Rgba::new(l, l, l, self.a);
        }

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Rgba::new(
            hue_channel(p, q, h + 1.0 / 3.0),
            hue_channel(p, q, h),
            hue_channel(p, q, h - 1.0 / 3.0),
            self.a,
        )
    }
}

impl From<Hsla> for Rgba {
    fn from(value: Hsla) -> Self {
        value.to_rgba()
    }
}

fn hue_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Immediate-mode 2D drawing surface used by visualisers and the scheduler.
///
/// Every call composites over what is already there with source-over
/// blending. Coordinates are logical pixels.
pub trait RenderTarget {
    fn fill_rect(&mut self, rect: RectF, color: Rgba) -> Result<()>;

    /// Fills `rect` with a linear gradient running from `start` to `end`.
    /// `stops` are `(offset, colour)` pairs with offsets in `[0, 1]`.
    fn fill_linear_gradient(
        &mut self,
        rect: RectF,
        start: Vec2,
        end: Vec2,
        stops: &[(f32, Rgba)],
    ) -> Result<()>;

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgba) -> Result<()>;

    fn stroke_line(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba) -> Result<()>;

    fn fill_canvas(&mut self, size: CanvasSize, color: Rgba) -> Result<()> {
        self.fill_rect(size.rect(), color)
    }
}

/// Software raster backed by a `tiny-skia` pixmap.
pub struct Raster {
    pixmap: Pixmap,
    size: CanvasSize,
    scale: f32,
}

impl Raster {
    /// Allocates a pixmap for a `width × height` logical canvas. The backing
    /// store is scaled by the device pixel ratio, capped at
    /// [`MAX_DEVICE_PIXEL_RATIO`].
    pub fn new(width: u32, height: u32, device_pixel_ratio: f32) -> Result<Self> {
        let scale = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio.min(MAX_DEVICE_PIXEL_RATIO)
        } else {
            1.0
        };
        let physical_width = (width as f32 * scale).ceil() as u32;
        let physical_height = (height as f32 * scale).ceil() as u32;
        let pixmap = Pixmap::new(physical_width, physical_height)
            .ok_or(VizError::InvalidInput("raster dimensions must be non-zero"))?;

        Ok(Self {
            pixmap,
            size: CanvasSize::new(width as f32, height as f32),
            scale,
        })
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Straight-alpha RGBA of a physical pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let pixel = self.pixmap.pixel(x, y)?.demultiply();
        Some([pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()])
    }

    /// Average Rec. 601 luma over the whole pixmap, in `[0, 1]`.
    pub fn mean_luminance(&self) -> f32 {
        let pixels = self.pixmap.pixels();
        if pixels.is_empty() {
            return 0.0;
        }

        let total: f64 = pixels
            .iter()
            .map(|pixel| {
                0.299 * f64::from(pixel.red())
                    + 0.587 * f64::from(pixel.green())
                    + 0.114 * f64::from(pixel.blue())
            })
            .sum();
        (total / (pixels.len() as f64 * 255.0)) as f32
    }

    fn transform(&self) -> Transform {
        Transform::from_scale(self.scale, self.scale)
    }

    fn solid(color: Rgba) -> Result<Paint<'static>> {
        let mut paint = Paint::default();
        paint.set_color(color.to_skia()?);
        paint.anti_alias = true;
        Ok(paint)
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("size", &self.size)
            .field("scale", &self.scale)
            .finish()
    }
}

impl RenderTarget for Raster {
    fn fill_rect(&mut self, rect: RectF, color: Rgba) -> Result<()> {
        if !rect.is_finite() {
            return Err(VizError::render("non-finite rectangle"));
        }
        if rect.width <= 0.0 || rect.height <= 0.0 || color.a <= 0.0 {
            return Ok(());
        }

        let paint = Self::solid(color)?;
        let area = Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
            .ok_or_else(|| VizError::render("invalid rectangle"))?;
        self.pixmap.fill_rect(area, &paint, self.transform(), None);
        Ok(())
    }

    fn fill_linear_gradient(
        &mut self,
        rect: RectF,
        start: Vec2,
        end: Vec2,
        stops: &[(f32, Rgba)],
    ) -> Result<()> {
        if !rect.is_finite() || !start.is_finite() || !end.is_finite() {
            return Err(VizError::render("non-finite gradient geometry"));
        }
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Ok(());
        }

        let mut paint = Paint::default();
        paint.anti_alias = true;
        match stops {
            [] => return Ok(()),
            // tiny-skia gradients need at least two stops.
            [(_, color)] => paint.set_color(color.to_skia()?),
            _ => {
                let stops = stops
                    .iter()
                    .map(|&(offset, color)| Ok(GradientStop::new(offset, color.to_skia()?)))
                    .collect::<Result<Vec<_>>>()?;
                paint.shader = LinearGradient::new(
                    Point::from_xy(start.x, start.y),
                    Point::from_xy(end.x, end.y),
                    stops,
                    SpreadMode::Pad,
                    Transform::identity(),
                )
                .ok_or_else(|| VizError::render("degenerate gradient"))?;
            }
        }

        let area = Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
            .ok_or_else(|| VizError::render("invalid rectangle"))?;
        self.pixmap.fill_rect(area, &paint, self.transform(), None);
        Ok(())
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgba) -> Result<()> {
        if !center.is_finite() || !radius.is_finite() {
            return Err(VizError::render("non-finite circle"));
        }
        if radius <= 0.0 || color.a <= 0.0 {
            return Ok(());
        }

        let paint = Self::solid(color)?;
        let path = PathBuilder::from_circle(center.x, center.y, radius)
            .ok_or_else(|| VizError::render("invalid circle"))?;
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, self.transform(), None);
        Ok(())
    }

    fn stroke_line(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba) -> Result<()> {
        if !from.is_finite() || !to.is_finite() || !width.is_finite() {
            return Err(VizError::render("non-finite line"));
        }
        if width <= 0.0 || color.a <= 0.0 || from == to {
            return Ok(());
        }

        let paint = Self::solid(color)?;
        let mut builder = PathBuilder::new();
        builder.move_to(from.x, from.y);
        builder.line_to(to.x, to.y);
        let path = builder
            .finish()
            .ok_or_else(|| VizError::render("invalid line"))?;
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint, &stroke, self.transform(), None);
        Ok(())
    }
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect {
        rect: RectF,
        color: Rgba,
    },
    FillGradient {
        rect: RectF,
        stops: Vec<(f32, Rgba)>,
    },
    FillCircle {
        center: Vec2,
        radius: f32,
        color: Rgba,
    },
    StrokeLine {
        from: Vec2,
        to: Vec2,
        width: f32,
        color: Rgba,
    },
}

/// Render target that records commands instead of drawing them.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Vec<DrawCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn circles(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::FillCircle { .. }))
            .count()
    }

    pub fn lines(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::StrokeLine { .. }))
            .count()
    }
}

impl RenderTarget for CommandLog {
    fn fill_rect(&mut self, rect: RectF, color: Rgba) -> Result<()> {
        self.commands.push(DrawCommand::FillRect { rect, color });
        Ok(())
    }

    fn fill_linear_gradient(
        &mut self,
        rect: RectF,
        _start: Vec2,
        _end: Vec2,
        stops: &[(f32, Rgba)],
    ) -> Result<()> {
        self.commands.push(DrawCommand::FillGradient {
            rect,
            stops: stops.to_vec(),
        });
        Ok(())
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgba) -> Result<()> {
        self.commands.push(DrawCommand::FillCircle {
            center,
            radius,
            color,
        });
        Ok(())
    }

    fn stroke_line(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba) -> Result<()> {
        self.commands.push(DrawCommand::StrokeLine {
            from,
            to,
            width,
            color,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Rgba, expected: Rgba) {
        for (a, e) in [
            (actual.r, expected.r),
            (actual.g, expected.g),
            (actual.b, expected.b),
            (actual.a, expected.a),
        ] {
            assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn hsl_primaries_convert() {
        let red = Rgba::new(1.0, 0.0, 0.0, 1.0);
        let green = Rgba::new(0.0, 1.0, 0.0, 0.5);
        let blue = Rgba::new(0.0, 0.0, 1.0, 1.0);
        assert_close(Hsla::new(0.0, 100.0, 50.0, 1.0).to_rgba(), red);
        assert_close(Hsla::new(120.0, 100.0, 50.0, 0.5).to_rgba(), green);
        assert_close(Hsla::new(600.0, 100.0, 50.0, 1.0).to_rgba(), blue);
        assert_close(
            Rgba::from(Hsla::new(42.0, 0.0, 65.0, 1.0)),
            Rgba::new(0.65, 0.65, 0.65, 1.0),
        );
    }

    #[test]
    fn raster_caps_device_pixel_ratio() {
        let raster = Raster::new(100, 50, 3.0).unwrap();
        assert_eq!(raster.scale(), MAX_DEVICE_PIXEL_RATIO);
        assert_eq!(raster.pixmap().width(), 200);
        assert_eq!(raster.pixmap().height(), 100);
        assert!(Raster::new(0, 10, 1.0).is_err());
    }

    #[test]
    fn raster_fills_and_blends() {
        let mut raster = Raster::new(10, 10, 1.0).unwrap();
        let size = raster.size();
        raster.fill_canvas(size, Rgba::rgb8(255, 0, 0)).unwrap();
        assert_eq!(raster.pixel(5, 5), Some([255, 0, 0, 255]));

        raster
            .fill_canvas(size, Rgba::rgb8(0, 0, 255).with_alpha(0.5))
            .unwrap();
        let [r, _, b, a] = raster.pixel(5, 5).unwrap();
        assert!((126..=129).contains(&r));
        assert!((126..=129).contains(&b));
        assert_eq!(a, 255);
    }

    #[test]
    fn raster_draws_circles_and_lines() {
        let mut raster = Raster::new(40, 40, 1.0).unwrap();
        let white = Rgba::rgb8(255, 255, 255);
        raster.fill_circle(Vec2::new(10.0, 10.0), 4.0, white).unwrap();
        raster
            .stroke_line(Vec2::new(0.0, 30.5), Vec2::new(40.0, 30.5), 2.0, white)
            .unwrap();

        assert_eq!(raster.pixel(10, 10), Some([255, 255, 255, 255]));
        assert_eq!(raster.pixel(20, 30).map(|p| p[3]), Some(255));
        assert_eq!(raster.pixel(30, 10), Some([0, 0, 0, 0]));
        assert!(raster.mean_luminance() > 0.0);
    }

    #[test]
    fn raster_rejects_non_finite_geometry() {
        let mut raster = Raster::new(10, 10, 1.0).unwrap();
        let white = Rgba::rgb8(255, 255, 255);
        assert!(raster.fill_circle(Vec2::new(f32::NAN, 1.0), 2.0, white).is_err());
        assert!(raster
            .stroke_line(Vec2::ZERO, Vec2::new(f32::INFINITY, 0.0), 1.0, white)
            .is_err());
        assert!(raster.fill_circle(Vec2::new(5.0, 5.0), 0.0, white).is_ok());
    }

    #[test]
    fn gradient_fills_whole_rect() {
        let mut raster = Raster::new(20, 20, 1.0).unwrap();
        let size = raster.size();
        raster
            .fill_linear_gradient(
                size.rect(),
                Vec2::ZERO,
                Vec2::new(20.0, 20.0),
                &[(0.0, Rgba::rgb8(0, 0, 0)), (1.0, Rgba::rgb8(255, 255, 255))],
            )
            .unwrap();

        let dark = raster.pixel(0, 0).unwrap();
        let light = raster.pixel(19, 19).unwrap();
        assert_eq!(dark[3], 255);
        assert!(light[0] > dark[0]);
    }

    #[test]
    fn command_log_counts_primitives() {
        let mut log = CommandLog::new();
        let color = Rgba::rgb8(1, 2, 3);
        log.fill_canvas(CanvasSize::new(4.0, 4.0), color).unwrap();
        log.fill_circle(Vec2::ONE, 1.0, color).unwrap();
        log.stroke_line(Vec2::ZERO, Vec2::ONE, 1.0, color).unwrap();
        log.stroke_line(Vec2::ZERO, Vec2::X, 1.0, color).unwrap();

        assert_eq!(log.commands().len(), 4);
        assert_eq!(log.circles(), 1);
        assert_eq!(log.lines(), 2);
        log.clear();
        assert!(log.commands().is_empty());
    }
}
