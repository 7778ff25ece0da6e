//! Color layouts and channel-count conversion.
//!
//! Every decoder produces pixels in its native layout (1 to 4 interleaved
//! 8-bit channels) and calls [`convert`] when the caller requested a
//! different channel count. Conversions are small pure functions looked up
//! by `(source channels, destination channels)`.

use crate::error::{checked_size, Error, Result};

/// Interleaved 8-bit pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColorType {
    /// Grayscale, 1 byte per pixel.
    Gray = 1,
    /// Grayscale with alpha, 2 bytes per pixel.
    GrayAlpha = 2,
    /// RGB, 3 bytes per pixel.
    Rgb = 3,
    /// RGBA, 4 bytes per pixel.
    Rgba = 4,
}

impl ColorType {
    /// Returns the number of bytes per pixel for this color type.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        self as usize
    }

    /// Layout with `channels` interleaved bytes per pixel.
    pub const fn from_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(ColorType::Gray),
            2 => Some(ColorType::GrayAlpha),
            3 => Some(ColorType::Rgb),
            4 => Some(ColorType::Rgba),
            _ => None,
        }
    }

    /// Whether the layout carries an alpha channel.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(self, ColorType::GrayAlpha | ColorType::Rgba)
    }
}

impl TryFrom<u8> for ColorType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        ColorType::from_channels(value as usize).ok_or(value)
    }
}

impl From<ColorType> for u8 {
    fn from(color: ColorType) -> Self {
        color as u8
    }
}

/// Integer luma used for every color to gray reduction.
///
/// Weights are BT.601 scaled by 256 and the result is truncated:
/// `(77*R + 150*G + 29*B) >> 8`.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8
}

type PixelFn = fn(&[u8], &mut [u8]);

fn gray_to_gray_alpha(s: &[u8], d: &mut [u8]) {
    d[0] = s[0];
    d[1] = 255;
}

fn gray_to_rgb(s: &[u8], d: &mut [u8]) {
    d[0] = s[0];
    d[1] = s[0];
    d[2] = s[0];
}

fn gray_to_rgba(s: &[u8], d: &mut [u8]) {
    gray_to_rgb(s, d);
    d[3] = 255;
}

fn gray_alpha_to_gray(s: &[u8], d: &mut [u8]) {
    d[0] = s[0];
}

fn gray_alpha_to_rgb(s: &[u8], d: &mut [u8]) {
    gray_to_rgb(s, d);
}

fn gray_alpha_to_rgba(s: &[u8], d: &mut [u8]) {
    gray_to_rgb(s, d);
    d[3] = s[1];
}

fn rgb_to_rgba(s: &[u8], d: &mut [u8]) {
    d[..3].copy_from_slice(&s[..3]);
    d[3] = 255;
}

fn rgb_to_gray(s: &[u8], d: &mut [u8]) {
    d[0] = luma(s[0], s[1], s[2]);
}

fn rgb_to_gray_alpha(s: &[u8], d: &mut [u8]) {
    d[0] = luma(s[0], s[1], s[2]);
    d[1] = 255;
}

fn rgba_to_gray(s: &[u8], d: &mut [u8]) {
    d[0] = luma(s[0], s[1], s[2]);
}

fn rgba_to_gray_alpha(s: &[u8], d: &mut [u8]) {
    d[0] = luma(s[0], s[1], s[2]);
    d[1] = s[3];
}

fn rgba_to_rgb(s: &[u8], d: &mut [u8]) {
    d[..3].copy_from_slice(&s[..3]);
}

/// Conversion table indexed by `[src - 1][dst - 1]`; the diagonal is unused.
const CONVERTERS: [[Option<PixelFn>; 4]; 4] = [
    [None, Some(gray_to_gray_alpha), Some(gray_to_rgb), Some(gray_to_rgba)],
    [Some(gray_alpha_to_gray), None, Some(gray_alpha_to_rgb), Some(gray_alpha_to_rgba)],
    [Some(rgb_to_gray), Some(rgb_to_gray_alpha), None, Some(rgb_to_rgba)],
    [Some(rgba_to_gray), Some(rgba_to_gray_alpha), Some(rgba_to_rgb), None],
];

/// Reinterleave `width * height` pixels from `src_channels` to `dst_channels`.
///
/// Missing alpha is filled with 255, gray is broadcast to RGB, and color is
/// reduced to gray with [`luma`]. Equal channel counts return the input
/// unchanged.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVariant`] when either count is outside `1..=4`
/// and [`Error::CorruptStream`] when `data` is shorter than the image.
pub fn convert(
    data: Vec<u8>,
    src_channels: usize,
    dst_channels: usize,
    width: usize,
    height: usize,
) -> Result<Vec<u8>> {
    if src_channels == dst_channels {
        return Ok(data);
    }
    if !(1..=4).contains(&src_channels) || !(1..=4).contains(&dst_channels) {
        return Err(Error::unsupported(format!(
            "channel conversion {src_channels} -> {dst_channels}"
        )));
    }

    let pixels = checked_size(width, height, 1)?;
    if data.len() < checked_size(pixels, src_channels, 1)? {
        return Err(Error::corrupt("pixel buffer shorter than image"));
    }

    let mut out = vec![0u8; checked_size(pixels, dst_channels, 1)?];
    if let Some(f) = CONVERTERS[src_channels - 1][dst_channels - 1] {
        for (s, d) in data
            .chunks_exact(src_channels)
            .zip(out.chunks_exact_mut(dst_channels))
        {
            f(s, d);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(ColorType::Gray.bytes_per_pixel(), 1);
        assert_eq!(ColorType::GrayAlpha.bytes_per_pixel(), 2);
        assert_eq!(ColorType::Rgb.bytes_per_pixel(), 3);
        assert_eq!(ColorType::Rgba.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_color_type_try_from() {
        assert!(matches!(ColorType::try_from(1), Ok(ColorType::Gray)));
        assert!(matches!(ColorType::try_from(4), Ok(ColorType::Rgba)));
        assert!(ColorType::try_from(0).is_err());
        assert!(ColorType::try_from(5).is_err());
        assert_eq!(u8::from(ColorType::Rgb), 3);
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 149);
        assert_eq!(luma(0, 0, 255), 28);
    }

    #[test]
    fn test_gray_to_rgba_fills_alpha() {
        let out = convert(vec![10, 200], 1, 4, 2, 1).unwrap();
        assert_eq!(out, vec![10, 10, 10, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn test_gray_alpha_keeps_alpha() {
        let out = convert(vec![7, 99], 2, 4, 1, 1).unwrap();
        assert_eq!(out, vec![7, 7, 7, 99]);
        let out = convert(vec![7, 99], 2, 1, 1, 1).unwrap();
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn test_rgba_to_gray_alpha() {
        let out = convert(vec![255, 255, 255, 3], 4, 2, 1, 1).unwrap();
        assert_eq!(out, vec![255, 3]);
    }

    #[test]
    fn test_rgb_to_rgba_and_back() {
        let rgb = vec![1, 2, 3, 4, 5, 6];
        let rgba = convert(rgb.clone(), 3, 4, 2, 1).unwrap();
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(convert(rgba, 4, 3, 2, 1).unwrap(), rgb);
    }

    #[test]
    fn test_same_channels_is_identity() {
        let data = vec![9, 8, 7];
        assert_eq!(convert(data.clone(), 3, 3, 1, 1).unwrap(), data);
    }

    #[test]
    fn test_rejects_bad_channel_counts() {
        assert!(matches!(
            convert(vec![0; 4], 4, 5, 1, 1),
            Err(Error::UnsupportedVariant(_))
        ));
        assert!(matches!(
            convert(vec![0; 2], 3, 4, 1, 1),
            Err(Error::CorruptStream(_))
        ));
    }
}
