use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut},
    rect::Rect,
};

use crate::Region;

pub const REGION_COLOR: Rgb<u8> = Rgb([255, 105, 180]);

#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub border_thickness: u32,
    pub region_color: Rgb<u8>,
    pub endpoint_radius: i32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            border_thickness: 3,
            region_color: REGION_COLOR,
            endpoint_radius: 4,
        }
    }
}

pub struct Visualizer {
    config: VisualizationConfig,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            config: VisualizationConfig::default(),
        }
    }

    /// Outlines `region` with a stroke that grows inwards from its edge, so
    /// nothing is drawn outside `[x_start, x_stop) x [y_start, y_stop)`.
    pub fn draw_region_outline(&self, image: &mut RgbImage, region: &Region) {
        let width = region.width();
        let height = region.height();

        for t in 0..self.config.border_thickness {
            if width <= 2 * t || height <= 2 * t {
                break;
            }

            let rect = Rect::at((region.x_start + t) as i32, (region.y_start + t) as i32)
                .of_size(width - 2 * t, height - 2 * t);
            draw_hollow_rect_mut(image, rect, self.config.region_color);
        }
    }

    pub fn draw_match(&self, image: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
        let start = (from.0 as f32, from.1 as f32);
        let end = (to.0 as f32, to.1 as f32);

        draw_line_segment_mut(image, start, end, color);
        draw_hollow_circle_mut(image, (from.0 as i32, from.1 as i32), self.config.endpoint_radius, color);
        draw_hollow_circle_mut(image, (to.0 as i32, to.1 as i32), self.config.endpoint_radius, color);
    }

    pub fn palette_color(&self, index: usize) -> Rgb<u8> {
        let hue = (index as f32 * 47.0) % 360.0;
        self.hsv_to_rgb(hue, 0.9, 1.0)
    }

    fn hsv_to_rgb(&self, h: f32, s: f32, v: f32) -> Rgb<u8> {
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = if h < 60.0 {
            (c, x, 0.0)
        } else if h < 120.0 {
            (x, c, 0.0)
        } else if h < 180.0 {
            (0.0, c, x)
        } else if h < 240.0 {
            (0.0, x, c)
        } else if h < 300.0 {
            (x, 0.0, c)
        } else {
            (c, 0.0, x)
        };

        Rgb([
            ((r + m) * 255.0) as u8,
            ((g + m) * 255.0) as u8,
            ((b + m) * 255.0) as u8,
        ])
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Multiplies every channel by `factor`, saturating at 255.
pub fn scale_brightness(image: &RgbImage, factor: f64) -> RgbImage {
    let mut scaled = image.clone();
    for pixel in scaled.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as f64 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    scaled
}
