//! Software surface backed by an RGBA image.
//!
//! Clipping is rectangular: every clip shape is reduced to the axis-aligned
//! bounding box of its transformed bounds, intersected with the clip already
//! in effect. Fills are axis-aligned as well (the AABB of the transformed
//! rectangle). This is enough for layer compositing and visual checks; it is
//! not meant to be an anti-aliased rasterizer.

use std::path::Path;

use image::{Rgba, RgbaImage};

use super::{Canvas, Surface, SurfaceFactory, SurfaceSize};
use crate::clip::ClipShape;
use crate::color::Color;
use crate::error::SurfaceError;
use crate::geometry::Rect;
use crate::transform::Transform;

pub struct RasterSurface {
    pixels: RgbaImage,
    size: SurfaceSize,
    /// Current clip in device pixels (`None` = whole surface)
    clip: Option<Rect>,
    saved: Vec<Option<Rect>>,
}

impl RasterSurface {
    pub fn new(size: SurfaceSize) -> Self {
        let (width, height) = size.physical();
        Self {
            pixels: RgbaImage::new(width, height),
            size,
            clip: None,
            saved: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Pixel at device coordinates, `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x < self.pixels.width() && y < self.pixels.height() {
            Some(self.pixels.get_pixel(x, y).0)
        } else {
            None
        }
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
        self.pixels.save(path)
    }

    fn device_transform(&self, transform: &Transform) -> Transform {
        Transform::scale(self.size.pixel_ratio).then(transform)
    }

    /// Integer pixel span covered by `rect` (device space), clipped.
    fn pixel_span(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let bounds = Rect::from_size(self.pixels.width() as f32, self.pixels.height() as f32);
        let mut area = rect.intersect(&bounds);
        if let Some(clip) = self.clip {
            area = area.intersect(&clip);
        }
        if area.is_empty() {
            return None;
        }
        let x0 = area.x.round().max(0.0) as u32;
        let y0 = area.y.round().max(0.0) as u32;
        let x1 = (area.right().round() as u32).min(self.pixels.width());
        let y1 = (area.bottom().round() as u32).min(self.pixels.height());
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }
}

fn blend_over(dst: &mut Rgba<u8>, src: [u8; 4]) {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let sc = src[c] as f32 / 255.0;
        let dc = dst.0[c] as f32 / 255.0;
        let out = (sc * sa + dc * da * (1.0 - sa)) / out_a;
        dst.0[c] = (out * 255.0).round() as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}

impl Canvas for RasterSurface {
    fn save(&mut self) {
        self.saved.push(self.clip);
    }

    fn restore(&mut self) {
        match self.saved.pop() {
            Some(clip) => self.clip = clip,
            None => log::warn!("RasterSurface: restore without matching save"),
        }
    }

    fn clip(&mut self, shape: &ClipShape, transform: &Transform) {
        let area = self
            .device_transform(transform)
            .transform_rect(&shape.bounds());
        let area = if shape.is_empty() {
            Rect::default()
        } else {
            area
        };
        self.clip = Some(match self.clip {
            Some(current) => current.intersect(&area),
            None => area,
        });
    }

    fn clear_rect(&mut self, rect: Rect) {
        let device = Transform::scale(self.size.pixel_ratio).transform_rect(&rect);
        if let Some((x0, y0, x1, y1)) = self.pixel_span(device) {
            for y in y0..y1 {
                for x in x0..x1 {
                    self.pixels.put_pixel(x, y, Rgba([0, 0, 0, 0]));
                }
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, transform: &Transform, color: Color) {
        let device = self.device_transform(transform).transform_rect(&rect);
        let src = color.to_rgba8();
        if let Some((x0, y0, x1, y1)) = self.pixel_span(device) {
            for y in y0..y1 {
                for x in x0..x1 {
                    blend_over(self.pixels.get_pixel_mut(x, y), src);
                }
            }
        }
    }
}

impl Surface for RasterSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        if size != self.size {
            *self = RasterSurface::new(size);
        }
    }

    fn clear(&mut self, color: Option<Color>) {
        let fill = Rgba(color.unwrap_or(Color::TRANSPARENT).to_rgba8());
        for pixel in self.pixels.pixels_mut() {
            *pixel = fill;
        }
    }

    fn fade(&mut self, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        for pixel in self.pixels.pixels_mut() {
            pixel.0[3] = (pixel.0[3] as f32 * alpha).round() as u8;
        }
    }

    fn draw_surface(&mut self, source: &Self) {
        let width = self.pixels.width().min(source.pixels.width());
        let height = self.pixels.height().min(source.pixels.height());
        for y in 0..height {
            for x in 0..width {
                let src = source.pixels.get_pixel(x, y).0;
                blend_over(self.pixels.get_pixel_mut(x, y), src);
            }
        }
    }
}

/// Creates [`RasterSurface`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterSurfaceFactory;

impl SurfaceFactory for RasterSurfaceFactory {
    type Surface = RasterSurface;

    fn create_surface(&mut self, size: SurfaceSize) -> Result<RasterSurface, SurfaceError> {
        if !size.is_valid() {
            return Err(SurfaceError::InvalidSize {
                width: size.width,
                height: size.height,
                pixel_ratio: size.pixel_ratio,
            });
        }
        Ok(RasterSurface::new(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> RasterSurface {
        RasterSurface::new(SurfaceSize::new(20, 20, 1.0))
    }

    #[test]
    fn test_fill_rect_respects_clip() {
        let mut s = surface();
        s.save();
        s.clip(
            &ClipShape::Rect(Rect::new(0.0, 0.0, 5.0, 5.0)),
            &Transform::IDENTITY,
        );
        s.fill_rect(Rect::from_size(20.0, 20.0), &Transform::IDENTITY, Color::WHITE);
        s.restore();

        assert_eq!(s.pixel(2, 2), Some([255, 255, 255, 255]));
        assert_eq!(s.pixel(10, 10), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_pixel_ratio_scales_backing_store() {
        let mut s = RasterSurface::new(SurfaceSize::new(10, 10, 2.0));
        assert_eq!(s.image().dimensions(), (20, 20));
        s.fill_rect(Rect::new(5.0, 5.0, 5.0, 5.0), &Transform::IDENTITY, Color::BLACK);
        assert_eq!(s.pixel(19, 19), Some([0, 0, 0, 255]));
        assert_eq!(s.pixel(9, 9), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_clear_and_fade() {
        let mut s = surface();
        s.clear(Some(Color::WHITE));
        assert_eq!(s.pixel(0, 0), Some([255, 255, 255, 255]));
        s.fade(0.5);
        assert_eq!(s.pixel(0, 0).map(|p| p[3]), Some(128));
        s.clear(None);
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_draw_surface_composites_over() {
        let mut bottom = surface();
        bottom.clear(Some(Color::BLACK));
        let mut top = surface();
        top.fill_rect(Rect::new(0.0, 0.0, 10.0, 20.0), &Transform::IDENTITY, Color::WHITE);

        bottom.draw_surface(&top);
        assert_eq!(bottom.pixel(5, 5), Some([255, 255, 255, 255]));
        assert_eq!(bottom.pixel(15, 5), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_factory_rejects_empty_size() {
        let mut factory = RasterSurfaceFactory;
        assert!(factory.create_surface(SurfaceSize::new(0, 10, 1.0)).is_err());
        assert!(factory.create_surface(SurfaceSize::new(10, 10, 1.0)).is_ok());
    }
}
