//! Drawing surfaces annotations are replayed onto

use crate::types::*;
use image::{Rgba, RgbaImage};
use vello_cpu::kurbo::{self, Shape};
use vello_cpu::{Pixmap, RenderContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Composite {
    /// Paint over what is there
    #[default]
    DrawOver,
    /// Clear to transparent where the stroke passes
    Erase,
}

/// Minimal 2D context. Coordinates are pixels of the surface.
pub trait DrawSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn clear(&mut self);
    fn set_composite(&mut self, mode: Composite);
    fn set_stroke(&mut self, color: Color, width: f32);
    fn stroke_polyline(&mut self, points: &[[f32; 2]]);
}

/// Replay `instructions` onto `surface`, mapping page fractions to the
/// surface's current pixel size and widths by `density`
pub fn draw_instructions<S: DrawSurface + ?Sized>(
    surface: &mut S,
    instructions: &[DrawInstruction],
    density: f32,
) {
    let width = surface.width() as f32;
    let height = surface.height() as f32;

    surface.clear();
    for instruction in instructions {
        let mode = match instruction.tool {
            Tool::Eraser => Composite::Erase,
            _ => Composite::DrawOver,
        };
        surface.set_composite(mode);
        surface.set_stroke(instruction.color, instruction.width * density);

        let points: Vec<[f32; 2]> = instruction
            .points
            .iter()
            .map(|[u, v]| [u * width, v * height])
            .collect();
        surface.stroke_polyline(&points);
    }
}

/// Ink layer rasterized with `vello_cpu`, round caps and joins.
///
/// Each stroke is rendered into its own premultiplied buffer and then
/// composited onto the layer, over for the pen and destination-out for the
/// eraser. Sides are limited to `u16::MAX` pixels.
pub struct RasterSurface {
    layer: Pixmap,
    composite: Composite,
    color: [u8; 3],
    width: f32,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let extent = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
        Self {
            layer: Pixmap::new(extent(width), extent(height)),
            composite: Composite::DrawOver,
            color: [0, 0, 0],
            width: 1.0,
        }
    }

    /// Straight-alpha copy of the layer
    pub fn to_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width(), self.height());
        for (pixel, src) in out
            .pixels_mut()
            .zip(self.layer.data_as_u8_slice().chunks_exact(4))
        {
            *pixel = unpremultiply(src);
        }
        out
    }

    fn render_stroke(&self, points: &[[f32; 2]]) -> Pixmap {
        let (w, h) = (self.layer.width(), self.layer.height());
        let mut ctx = RenderContext::new(w, h);
        let [r, g, b] = self.color;
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, 255));

        let width = f64::from(self.width.max(1.0));
        let to_point = |[x, y]: [f32; 2]| kurbo::Point::new(f64::from(x), f64::from(y));
        let first = points[0];
        if points.iter().all(|p| *p == first) {
            // Round caps on a zero-length segment draw nothing
            let dot = kurbo::Circle::new(to_point(first), width / 2.0);
            ctx.fill_path(&dot.to_path(0.1));
        } else {
            let mut path = kurbo::BezPath::new();
            path.move_to(to_point(first));
            for &point in &points[1..] {
                path.line_to(to_point(point));
            }
            ctx.set_stroke(
                kurbo::Stroke::new(width)
                    .with_caps(kurbo::Cap::Round)
                    .with_join(kurbo::Join::Round),
            );
            ctx.stroke_path(&path);
        }

        ctx.flush();
        let mut ink = Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut ink);
        ink
    }
}

impl DrawSurface for RasterSurface {
    fn width(&self) -> u32 {
        u32::from(self.layer.width())
    }

    fn height(&self) -> u32 {
        u32::from(self.layer.height())
    }

    fn clear(&mut self) {
        self.layer.data_as_u8_slice_mut().fill(0);
    }

    fn set_composite(&mut self, mode: Composite) {
        self.composite = mode;
    }

    fn set_stroke(&mut self, color: Color, width: f32) {
        self.color = color.rgb();
        self.width = width;
    }

    fn stroke_polyline(&mut self, points: &[[f32; 2]]) {
        if points.is_empty() || self.layer.width() == 0 || self.layer.height() == 0 {
            return;
        }
        let ink = self.render_stroke(points);
        let dst = self.layer.data_as_u8_slice_mut();
        let src = ink.data_as_u8_slice();
        match self.composite {
            Composite::DrawOver => premul_over(dst, src),
            Composite::Erase => destination_out(dst, src),
        }
    }
}

fn mul_div255(a: u8, b: u8) -> u8 {
    ((u16::from(a) * u16::from(b) + 127) / 255) as u8
}

fn premul_over(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let inv = 255 - s[3];
        for (dc, &sc) in d.iter_mut().zip(s) {
            *dc = sc.saturating_add(mul_div255(*dc, inv));
        }
    }
}

fn destination_out(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let inv = 255 - s[3];
        for c in d.iter_mut() {
            *c = mul_div255(*c, inv);
        }
    }
}

fn unpremultiply(src: &[u8]) -> Rgba<u8> {
    let a = src[3];
    if a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |c: u8| ((u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
    Rgba([channel(src[0]), channel(src[1]), channel(src[2]), a])
}

/// Page image with the annotations burned in
pub fn flatten(page: &RgbaImage, instructions: &[DrawInstruction], density: f32) -> RgbaImage {
    let mut ink = RasterSurface::new(page.width(), page.height());
    draw_instructions(&mut ink, instructions, density);

    let mut out = page.clone();
    image::imageops::overlay(&mut out, &ink.to_image(), 0, 0);
    out
}
