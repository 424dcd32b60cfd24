//! Text selection records and the glyph-to-rectangle grouping

use image::{Pixel, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::types::CharacterBounds;
use crate::settings::SelectionSettings;

/// Highlight fill used for selection overlays (blue at 15% opacity)
pub const HIGHLIGHT: Rgba<u8> = Rgba([0, 100, 255, 38]);

/// A merged highlight region in page units, top-left origin
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl SelectionRect {
    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            left: self.left * factor,
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub rects: Vec<SelectionRect>,
}

/// A selection on a single page. Pages are 0-based here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSelection {
    pub start_page: usize,
    pub end_page: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub text: String,
    pub bounds: SelectionBounds,
}

impl TextSelection {
    /// A selection anchored on one character, with no text or bounds yet
    #[must_use]
    pub fn collapsed(page: usize, index: usize) -> Self {
        Self {
            start_page: page,
            end_page: page,
            start_index: index,
            end_index: index,
            ..Self::default()
        }
    }

    /// `(min, max)` of the two indices, whatever the drag direction
    #[must_use]
    pub fn ordered_indices(&self) -> (usize, usize) {
        ordered(self.start_index, self.end_index)
    }

    /// Overlay rectangles for `page`, scaled to the current zoom. Only the
    /// start page carries the highlight.
    #[must_use]
    pub fn overlay_rects(&self, page: usize, scale: f64) -> Vec<SelectionRect> {
        if page != self.start_page {
            return Vec::new();
        }
        self.bounds.rects.iter().map(|r| r.scaled(scale)).collect()
    }
}

#[must_use]
pub fn ordered(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

fn same_line(prev: &CharacterBounds, next: &CharacterBounds, tuning: &SelectionSettings) -> bool {
    (next.top - prev.top).abs() < tuning.line_tolerance
        && (next.bottom - prev.bottom).abs() < tuning.line_tolerance
        && next.left - prev.right < tuning.line_break_gap
}

/// Groups glyph bounds (in reading order) into highlight rectangles.
///
/// Glyphs are split into lines by vertical drift or a large horizontal gap;
/// within a line, glyphs closer than the merge gap share a rectangle. Every
/// rectangle spans its line's full height and is padded on all sides.
#[must_use]
pub fn group_rects(bounds: &[CharacterBounds], tuning: &SelectionSettings) -> Vec<SelectionRect> {
    let mut lines: Vec<&[CharacterBounds]> = Vec::new();
    let mut line_start = 0;
    for i in 1..bounds.len() {
        if !same_line(&bounds[i - 1], &bounds[i], tuning) {
            lines.push(&bounds[line_start..i]);
            line_start = i;
        }
    }
    if line_start < bounds.len() {
        lines.push(&bounds[line_start..]);
    }

    let mut rects: Vec<SelectionRect> = Vec::new();
    for line in lines {
        let top = line.iter().map(|b| b.top).fold(f64::INFINITY, f64::min);
        let bottom = line.iter().map(|b| b.bottom).fold(f64::NEG_INFINITY, f64::max);

        for (i, glyph) in line.iter().enumerate() {
            let merges = i > 0 && glyph.left - line[i - 1].right < tuning.merge_gap;
            if merges {
                if let Some(rect) = rects.last_mut() {
                    rect.right = glyph.right + tuning.pad_x;
                    continue;
                }
            }
            rects.push(SelectionRect {
                left: glyph.left - tuning.pad_x,
                top: top - tuning.pad_y,
                right: glyph.right + tuning.pad_x,
                bottom: bottom + tuning.pad_y,
            });
        }
    }
    rects
}

/// Blends `rects` (already in pixel units) onto an image
pub fn paint_highlights(image: &mut RgbaImage, rects: &[SelectionRect], color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    for rect in rects {
        let x0 = rect.left.max(0.0).floor() as u32;
        let y0 = rect.top.max(0.0).floor() as u32;
        let x1 = (rect.right.max(0.0).ceil() as u32).min(width);
        let y1 = (rect.bottom.max(0.0).ceil() as u32).min(height);
        for y in y0..y1 {
            for x in x0..x1 {
                image.get_pixel_mut(x, y).blend(&color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(left: f64, right: f64, top: f64, bottom: f64) -> CharacterBounds {
        CharacterBounds {
            left,
            right,
            top,
            bottom,
            line_height: 14.4,
        }
    }

    #[test]
    fn adjacent_glyphs_merge_into_one_padded_rect() {
        let bounds = [
            glyph(10.0, 16.0, 100.0, 112.0),
            glyph(17.0, 23.0, 100.5, 112.5),
            glyph(24.0, 30.0, 100.0, 112.0),
        ];
        let rects = group_rects(&bounds, &SelectionSettings::default());
        assert_eq!(
            rects,
            vec![SelectionRect {
                left: 9.0,
                top: 98.0,
                right: 31.0,
                bottom: 114.5,
            }]
        );
    }

    #[test]
    fn vertical_drift_within_tolerance_stays_on_line() {
        let bounds = [glyph(10.0, 16.0, 100.0, 112.0), glyph(17.0, 23.0, 101.9, 113.9)];
        assert_eq!(group_rects(&bounds, &SelectionSettings::default()).len(), 1);
    }

    #[test]
    fn vertical_drift_beyond_tolerance_starts_new_line() {
        let bounds = [glyph(10.0, 16.0, 100.0, 112.0), glyph(17.0, 23.0, 102.5, 114.5)];
        let rects = group_rects(&bounds, &SelectionSettings::default());
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[1].top, 100.5);
    }

    #[test]
    fn word_gap_splits_rect_but_not_line() {
        // gap of 8: above merge threshold, below line-break gap
        let bounds = [glyph(10.0, 16.0, 100.0, 112.0), glyph(24.0, 30.0, 100.0, 112.0)];
        let rects = group_rects(&bounds, &SelectionSettings::default());
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0].top, rects[1].top);
        assert_eq!(rects[0].bottom, rects[1].bottom);
    }

    #[test]
    fn large_gap_starts_new_line() {
        let bounds = [glyph(10.0, 16.0, 100.0, 112.0), glyph(40.0, 46.0, 100.0, 112.0)];
        let rects = group_rects(&bounds, &SelectionSettings::default());
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[1].left, 39.0);
    }

    #[test]
    fn empty_input_yields_no_rects() {
        assert!(group_rects(&[], &SelectionSettings::default()).is_empty());
    }

    #[test]
    fn overlay_only_on_start_page() {
        let mut selection = TextSelection::collapsed(2, 5);
        selection.bounds.rects.push(SelectionRect {
            left: 1.0,
            top: 2.0,
            right: 3.0,
            bottom: 4.0,
        });
        assert!(selection.overlay_rects(1, 2.0).is_empty());
        assert_eq!(
            selection.overlay_rects(2, 2.0),
            vec![SelectionRect {
                left: 2.0,
                top: 4.0,
                right: 6.0,
                bottom: 8.0,
            }]
        );
    }

    #[test]
    fn ordered_indices_normalize_reverse_drag() {
        let mut selection = TextSelection::collapsed(0, 9);
        selection.end_index = 3;
        assert_eq!(selection.ordered_indices(), (3, 9));
    }

    #[test]
    fn highlights_blend_inside_rect_only() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let rect = SelectionRect {
            left: 1.0,
            top: 1.0,
            right: 2.0,
            bottom: 2.0,
        };
        paint_highlights(&mut image, &[rect], HIGHLIGHT);
        assert_ne!(*image.get_pixel(1, 1), Rgba([255, 255, 255, 255]));
        assert_eq!(*image.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*image.get_pixel(2, 2), Rgba([255, 255, 255, 255]));
    }
}
