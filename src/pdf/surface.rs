//! Drawing sinks for rendered pages

use image::{Rgba, RgbaImage, imageops};

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Minimal 2D-canvas surface the renderer draws into.
///
/// Coordinates are device pixels. Writes outside the surface are clipped.
pub trait DrawingSurface {
    /// Backing store size in device pixels
    fn size(&self) -> (u32, u32);

    /// Reallocates the backing store; content is cleared.
    fn resize(&mut self, width: u32, height: u32);

    fn clear_rect(&mut self, x: u32, y: u32, width: u32, height: u32);

    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>);

    fn put_image_data(&mut self, image: &RgbaImage, x: u32, y: u32);

    /// Clears the whole surface
    fn clear(&mut self) {
        let (width, height) = self.size();
        self.clear_rect(0, 0, width, height);
    }
}

/// In-memory canvas backed by an RGBA image.
///
/// Tracks the CSS (layout) size separately from the pixel size so callers
/// can map pointer positions back to page units.
#[derive(Clone, Debug)]
pub struct Canvas {
    pixels: RgbaImage,
    css_width: f64,
    css_height: f64,
}

impl Canvas {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            css_width: f64::from(width),
            css_height: f64::from(height),
        }
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    #[must_use]
    pub fn css_size(&self) -> (f64, f64) {
        (self.css_width, self.css_height)
    }

    pub fn set_css_size(&mut self, width: f64, height: f64) {
        self.css_width = width;
        self.css_height = height;
    }

    fn clipped(&self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x_end = x.saturating_add(width).min(self.pixels.width());
        let y_end = y.saturating_add(height).min(self.pixels.height());
        (x, y, x_end, y_end)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl DrawingSurface for Canvas {
    fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.pixels.dimensions() != (width, height) {
            self.pixels = RgbaImage::new(width, height);
        } else {
            self.clear();
        }
    }

    fn clear_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.fill_rect(x, y, width, height, TRANSPARENT);
    }

    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>) {
        let (x0, y0, x1, y1) = self.clipped(x, y, width, height);
        for py in y0..y1 {
            for px in x0..x1 {
                self.pixels.put_pixel(px, py, color);
            }
        }
    }

    fn put_image_data(&mut self, image: &RgbaImage, x: u32, y: u32) {
        imageops::replace(&mut self.pixels, image, i64::from(x), i64::from(y));
    }
}
