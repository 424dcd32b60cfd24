//! Conversions between PDF space (origin bottom-left, Y up) and screen
//! space (origin top-left, Y down).
//!
//! Every Y flip in the crate goes through this module.

use super::types::{CharacterBounds, ClientRect, PageSize, PdfRect, Point};

#[must_use]
pub fn screen_to_pdf(point: Point, page_height: f64) -> Point {
    Point::new(point.x, page_height - point.y)
}

#[must_use]
pub fn pdf_to_screen(point: Point, page_height: f64) -> Point {
    Point::new(point.x, page_height - point.y)
}

/// Converts a native character box (PDF space) into normalized screen
/// bounds. Returns `None` when any coordinate is not finite.
#[must_use]
pub fn char_box_to_screen(
    left: f64,
    right: f64,
    bottom: f64,
    top: f64,
    page_height: f64,
    line_height: f64,
) -> Option<CharacterBounds> {
    if ![left, right, bottom, top].iter().all(|v| v.is_finite()) {
        return None;
    }
    let screen_top = page_height - top;
    let screen_bottom = page_height - bottom;
    Some(CharacterBounds {
        left: left.min(right),
        right: left.max(right),
        top: screen_top.min(screen_bottom),
        bottom: screen_top.max(screen_bottom),
        line_height,
    })
}

/// Screen-space rectangle (top-left origin) to PDF space
#[must_use]
pub fn screen_rect_to_pdf(left: f64, top: f64, right: f64, bottom: f64, page_height: f64) -> PdfRect {
    PdfRect::new(left, page_height - top, right, page_height - bottom)
}

/// Maps a pointer position in client coordinates onto page units using the
/// on-screen rectangle of the page's canvas.
///
/// Returns `None` for a degenerate (zero-sized) rectangle.
#[must_use]
pub fn client_to_page(client: Point, rect: ClientRect, page: PageSize) -> Option<Point> {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    Some(Point::new(
        (client.x - rect.left) / rect.width * page.width,
        (client.y - rect.top) / rect.height * page.height,
    ))
}

/// Affine view transform: scale, then rotate about the origin, then
/// translate by the pan offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f64,
    /// Degrees, clockwise in screen space
    pub rotation: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl ViewTransform {
    /// Row-major 2x3 matrix `[a, b, tx; c, d, ty]`
    #[must_use]
    pub fn matrix(&self) -> [[f64; 3]; 2] {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        [
            [cos * self.scale, -sin * self.scale, self.offset_x],
            [sin * self.scale, cos * self.scale, self.offset_y],
        ]
    }

    /// Page units to view units
    #[must_use]
    pub fn apply(&self, point: Point) -> Point {
        let [[a, b, tx], [c, d, ty]] = self.matrix();
        Point::new(a * point.x + b * point.y + tx, c * point.x + d * point.y + ty)
    }

    /// View units back to page units. `None` when the scale is zero or
    /// not finite, since the transform is then not invertible.
    #[must_use]
    pub fn invert(&self, point: Point) -> Option<Point> {
        if self.scale == 0.0 || !self.scale.is_finite() {
            return None;
        }
        let x = point.x - self.offset_x;
        let y = point.y - self.offset_y;
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        Some(Point::new(
            (cos * x + sin * y) / self.scale,
            (-sin * x + cos * y) / self.scale,
        ))
    }
}
