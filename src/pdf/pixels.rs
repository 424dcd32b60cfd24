//! Conversion of native bitmap memory into RGBA images

use image::RgbaImage;

use super::error::RenderFailure;

/// Pixel layouts reported by `FPDFBitmap_GetFormat`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitmapFormat {
    Gray,
    Bgr,
    Bgrx,
    Bgra,
}

impl BitmapFormat {
    pub fn from_native(code: i32) -> Result<Self, RenderFailure> {
        match code {
            1 => Ok(Self::Gray),
            2 => Ok(Self::Bgr),
            3 => Ok(Self::Bgrx),
            4 => Ok(Self::Bgra),
            other => Err(RenderFailure::UnsupportedFormat(other)),
        }
    }

    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Bgr => 3,
            Self::Bgrx | Self::Bgra => 4,
        }
    }
}

/// Converts a strided native buffer into a tightly packed RGBA image.
///
/// Rows are read `stride` bytes apart; padding at the end of each row is
/// skipped. Formats without alpha become fully opaque.
pub fn to_rgba(
    src: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    format: BitmapFormat,
) -> Result<RgbaImage, RenderFailure> {
    if width == 0 || height == 0 {
        return Ok(RgbaImage::new(width, height));
    }
    let bpp = format.bytes_per_pixel();
    let row_bytes = width as usize * bpp;
    if stride < row_bytes {
        return Err(RenderFailure::ShortBuffer {
            needed: row_bytes,
            actual: stride,
        });
    }
    let needed = stride * (height as usize - 1) + row_bytes;
    if src.len() < needed {
        return Err(RenderFailure::ShortBuffer {
            needed,
            actual: src.len(),
        });
    }

    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for row in src.chunks(stride).take(height as usize) {
        for px in row[..row_bytes].chunks_exact(bpp) {
            match format {
                BitmapFormat::Bgra => out.extend_from_slice(&[px[2], px[1], px[0], px[3]]),
                BitmapFormat::Bgr | BitmapFormat::Bgrx => {
                    out.extend_from_slice(&[px[2], px[1], px[0], 255]);
                }
                BitmapFormat::Gray => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
            }
        }
    }

    RgbaImage::from_raw(width, height, out).ok_or(RenderFailure::ShortBuffer {
        needed: width as usize * height as usize * 4,
        actual: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_swaps_red_and_blue() {
        // Two pixels: pure blue, half-transparent red (BGRA order).
        let src = [255, 0, 0, 255, 0, 0, 255, 128];
        let image = to_rgba(&src, 2, 1, 8, BitmapFormat::Bgra).unwrap();
        assert_eq!(image.as_raw(), &vec![0, 0, 255, 255, 255, 0, 0, 128]);
    }

    #[test]
    fn stride_padding_is_skipped() {
        // 1x2 BGRx image with 4 bytes of padding per row.
        let src = [10, 20, 30, 0, 9, 9, 9, 9, 40, 50, 60, 0];
        let image = to_rgba(&src, 1, 2, 8, BitmapFormat::Bgrx).unwrap();
        assert_eq!(image.as_raw(), &vec![30, 20, 10, 255, 60, 50, 40, 255]);
    }

    #[test]
    fn bgr_and_gray_become_opaque() {
        let bgr = to_rgba(&[1, 2, 3], 1, 1, 3, BitmapFormat::Bgr).unwrap();
        assert_eq!(bgr.as_raw(), &vec![3, 2, 1, 255]);

        let gray = to_rgba(&[7, 8], 2, 1, 2, BitmapFormat::Gray).unwrap();
        assert_eq!(gray.as_raw(), &vec![7, 7, 7, 255, 8, 8, 8, 255]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = to_rgba(&[0; 7], 2, 1, 8, BitmapFormat::Bgra).unwrap_err();
        assert!(matches!(err, RenderFailure::ShortBuffer { needed: 8, actual: 7 }));
    }

    #[test]
    fn unknown_format_code() {
        assert_eq!(
            BitmapFormat::from_native(9),
            Err(RenderFailure::UnsupportedFormat(9))
        );
        assert_eq!(BitmapFormat::from_native(4), Ok(BitmapFormat::Bgra));
    }
}
