//! Resampling transforms: scaling and arbitrary-angle rotation.
//!
//! - **Expand** (factor > 1): each output pixel is a bilinear blend of the
//!   2x2 source neighborhood around its back-projected position.
//! - **Shrink** (factor < 1): each output pixel averages every source pixel
//!   its back-projected box overlaps, weighted by the overlap.
//! - **Rotate**: the output canvas grows to hold the rotated bounding box;
//!   pixels whose antecedent falls outside the source are transparent.
//!
//! Results are always RGBA with `has_alpha` set. With the `parallel` feature
//! rows are computed on the rayon pool; output is identical either way.
//!
//! # Example
//!
//! ```rust
//! use pixkit::transform::{rotate, scale, Interpolation};
//! use pixkit::Image;
//!
//! let mut img = Image::new(40, 20).unwrap();
//! img.fill([200, 10, 10, 255]);
//!
//! let half = scale(&img, 0.5).unwrap();
//! assert_eq!((half.width(), half.height()), (20, 10));
//!
//! let turned = rotate(&img, 90.0, Interpolation::Bilinear).unwrap();
//! assert_eq!((turned.width(), turned.height()), (20, 40));
//! ```

use crate::error::{image_size, Error, Result};
use crate::image::Image;

/// Maximum dimension produced by a transform.
const MAX_DIMENSION: f64 = (1u32 << 24) as f64;

/// Sampling used by [`rotate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Nearest source pixel. Fastest, keeps hard edges.
    #[default]
    Nearest,
    /// Bilinear blend of the four surrounding pixels.
    Bilinear,
}

/// Sample `src` at the real position `(sx, sy)` with bilinear weights.
///
/// Positions more than half a pixel outside the image give a transparent
/// black pixel. Neighbors that fall outside are replaced by the inside one
/// on the same row or column.
pub fn bilinear_4points(src: &[u8], width: usize, height: usize, sx: f64, sy: f64) -> [u8; 4] {
    if sx < -0.5 || sx >= width as f64 - 0.5 || sy < -0.5 || sy >= height as f64 - 0.5 {
        return [0; 4];
    }

    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let (x1, y1) = (x0 + 1, y0 + 1);

    let rx0 = sx - x0 as f64;
    let rx1 = x1 as f64 - sx;
    let ry0 = sy - y0 as f64;
    let ry1 = y1 as f64 - sy;

    let (c0, c1) = clamp_pair(x0, x1, width as i64);
    let (r0, r1) = clamp_pair(y0, y1, height as i64);
    let at = |x: usize, y: usize| (y * width + x) * 4;
    let (k00, k01, k10, k11) = (at(c0, r0), at(c1, r0), at(c0, r1), at(c1, r1));

    let (w00, w01, w10, w11) = (ry1 * rx1, ry1 * rx0, ry0 * rx1, ry0 * rx0);
    let mut out = [0u8; 4];
    for (i, o) in out.iter_mut().enumerate() {
        let v = w00 * src[k00 + i] as f64
            + w01 * src[k01 + i] as f64
            + w10 * src[k10 + i] as f64
            + w11 * src[k11 + i] as f64;
        *o = v as u8;
    }
    out
}

/// Replace an out-of-range neighbor index with its in-range partner.
#[inline]
fn clamp_pair(lo: i64, hi: i64, max: i64) -> (usize, usize) {
    if lo < 0 {
        (hi as usize, hi as usize)
    } else if hi >= max {
        (lo as usize, lo as usize)
    } else {
        (lo as usize, hi as usize)
    }
}

/// Average the source pixels covered by a `1/factor`-wide box centered on
/// `(sx, sy)`, weighting edge pixels by their fractional overlap.
pub fn bilinear_pane(
    src: &[u8],
    width: usize,
    height: usize,
    sx: f64,
    sy: f64,
    factor: f64,
) -> [u8; 4] {
    let d = 1.0 / factor;
    let d2 = d * d;
    let r = d / 2.0;
    let (mx0, my0, mx1, my1) = (sx - r, sy - r, sx + r, sy + r);

    let x0 = (mx0.round() as i64).max(0);
    let y0 = (my0.round() as i64).max(0);
    let x1 = (mx1.round() as i64).min(width as i64 - 1);
    let y1 = (my1.round() as i64).min(height as i64 - 1);
    if x0 >= x1 || y0 >= y1 {
        return [0; 4];
    }

    let weight = |t: i64, t0: i64, t1: i64, m0: f64, m1: f64| {
        if t == t0 {
            t0 as f64 + 0.5 - m0
        } else if t == t1 {
            m1 - t1 as f64 + 0.5
        } else {
            1.0
        }
    };

    let mut acc = [0.0f64; 4];
    for x in x0..=x1 {
        let rx = weight(x, x0, x1, mx0, mx1);
        for y in y0..=y1 {
            let ry = weight(y, y0, y1, my0, my1);
            let k = (y as usize * width + x as usize) * 4;
            for (i, a) in acc.iter_mut().enumerate() {
                *a += src[k + i] as f64 * rx * ry;
            }
        }
    }
    acc.map(|v| (v / d2) as u8)
}

fn checked_dimension(v: f64) -> Result<u32> {
    if !v.is_finite() || v >= MAX_DIMENSION {
        return Err(Error::ResourceExhausted(format!("transform output of {v} pixels")));
    }
    Ok(v.max(0.0) as u32)
}

/// Allocate the output canvas of a transform, bounded in total size.
fn output_image(width: u32, height: u32) -> Result<Image> {
    image_size(width as usize, height as usize, 4)?;
    Image::new(width, height)
}

/// Fill every row of `out` with `pixel(x, y)`.
fn render<F>(out: &mut Image, pixel: F)
where
    F: Fn(usize, usize) -> [u8; 4] + Sync,
{
    let width = out.width() as usize;
    if width == 0 {
        return;
    }
    let row_len = width * 4;

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        out.pixels_mut()
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    px.copy_from_slice(&pixel(x, y));
                }
            });
    }

    #[cfg(not(feature = "parallel"))]
    {
        for (y, row) in out.pixels_mut().chunks_exact_mut(row_len).enumerate() {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&pixel(x, y));
            }
        }
    }
}

/// Scale by `factor`. The new size is the old one times `factor`, truncated.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when `factor` is not a positive
/// finite number.
pub fn scale(image: &Image, factor: f64) -> Result<Image> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(Error::InvalidParameter(format!("bad scale factor {factor}")));
    }
    if factor == 1.0 {
        return Ok(image.clone());
    }

    let width = checked_dimension(image.width() as f64 * factor)?;
    let height = checked_dimension(image.height() as f64 * factor)?;
    log::debug!(
        "scale {}x{} by {factor} -> {width}x{height}",
        image.width(),
        image.height()
    );
    let mut out = output_image(width, height)?;
    out.set_has_alpha(true);
    out.set_opacity(image.opacity());

    let (sw, sh) = (image.width() as usize, image.height() as usize);
    let src = image.pixels();
    if factor > 1.0 {
        render(&mut out, |x, y| {
            bilinear_4points(src, sw, sh, x as f64 / factor, y as f64 / factor)
        });
    } else {
        render(&mut out, |x, y| {
            bilinear_pane(src, sw, sh, x as f64 / factor, y as f64 / factor, factor)
        });
    }
    Ok(out)
}

/// Size of the canvas holding a `width` x `height` image rotated by
/// `degrees`.
pub fn rotated_size(degrees: f64, width: u32, height: u32) -> (u32, u32) {
    let a = degrees.to_radians();
    let (s, c) = a.sin_cos();
    let (w, h) = (width as f64, height as f64);
    let w1 = (c * w - s * h).abs();
    let h1 = (s * w + c * h).abs();
    let w2 = (c * w + s * h).abs();
    let h2 = (s * w - c * h).abs();
    (w1.max(w2).round() as u32, h1.max(h2).round() as u32)
}

/// Where the source point `(x, y)` lands on the canvas produced by
/// rotating a `width` x `height` image by `degrees`.
fn rotate_coords(degrees: f64, width: u32, height: u32, x: i32, y: i32) -> (i32, i32) {
    let a = degrees.to_radians();
    let (s, c) = a.sin_cos();
    let (w, h) = (width as f64, height as f64);
    let (x, y) = (x as f64, y as f64);
    let corners = [(-x, -y), (w - x, -y), (w - x, h - y), (-x, h - y)];

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    for (cx, cy) in corners {
        min_x = min_x.min(c * cx - s * cy);
        min_y = min_y.min(s * cx + c * cy);
    }
    ((-min_x).round() as i32, (-min_y).round() as i32)
}

/// Position of source pixel `(x, y)` in `rotate(image, degrees, _)`.
pub fn map_point(image: &Image, degrees: f64, x: i32, y: i32) -> (i32, i32) {
    rotate_coords(degrees, image.width(), image.height(), x, y)
}

/// Rotate by `degrees` about the image center.
///
/// The canvas is resized to the rotated bounding box; uncovered pixels are
/// transparent.
pub fn rotate(image: &Image, degrees: f64, quality: Interpolation) -> Result<Image> {
    if !degrees.is_finite() {
        return Err(Error::InvalidParameter(format!("bad rotation angle {degrees}")));
    }
    let (width, height) = rotated_size(degrees, image.width(), image.height());
    log::debug!(
        "rotate {}x{} by {degrees} ({quality:?}) -> {width}x{height}",
        image.width(),
        image.height()
    );
    let mut out = output_image(width, height)?;
    out.set_has_alpha(true);
    out.set_opacity(image.opacity());
    if image.is_empty() {
        return Ok(out);
    }

    // Inverse rotation maps each destination pixel back to the source.
    let (s, c) = (-degrees.to_radians()).sin_cos();
    let (ox, oy) = rotate_coords(degrees, image.width(), image.height(), 0, 0);
    let (sw, sh) = (image.width() as usize, image.height() as usize);
    let src = image.pixels();
    let antecedent = move |x: usize, y: usize| {
        let dx = x as f64 - ox as f64;
        let dy = y as f64 - oy as f64;
        (c * dx - s * dy, s * dx + c * dy)
    };

    match quality {
        Interpolation::Nearest => render(&mut out, |x, y| {
            let (sx, sy) = antecedent(x, y);
            let (xn, yn) = (sx.round(), sy.round());
            if xn < 0.0 || yn < 0.0 || xn >= sw as f64 || yn >= sh as f64 {
                return [0; 4];
            }
            let k = (yn as usize * sw + xn as usize) * 4;
            [src[k], src[k + 1], src[k + 2], src[k + 3]]
        }),
        Interpolation::Bilinear => render(&mut out, |x, y| {
            let (sx, sy) = antecedent(x, y);
            bilinear_4points(src, sw, sh, sx, sy)
        }),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: u32, h: u32) -> Image {
        let mut img = Image::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                img.set_pixel(x, y, [(x * 10) as u8, (y * 10) as u8, 100, 255]);
            }
        }
        img
    }

    #[test]
    fn test_scale_rejects_bad_factor() {
        let img = Image::new(2, 2).unwrap();
        assert!(matches!(scale(&img, 0.0), Err(Error::InvalidParameter(_))));
        assert!(matches!(scale(&img, -1.5), Err(Error::InvalidParameter(_))));
        assert!(matches!(scale(&img, f64::NAN), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_scale_one_is_copy() {
        let img = ramp(3, 2);
        assert_eq!(scale(&img, 1.0).unwrap(), img);
    }

    #[test]
    fn test_scale_sizes_truncate() {
        let img = ramp(5, 3);
        let up = scale(&img, 1.5).unwrap();
        assert_eq!((up.width(), up.height()), (7, 4));
        assert!(up.has_alpha());
        let down = scale(&img, 0.5).unwrap();
        assert_eq!((down.width(), down.height()), (2, 1));
    }

    #[test]
    fn test_expand_interpolates_between_neighbors() {
        let img = ramp(4, 1);
        let up = scale(&img, 2.0).unwrap();
        // x = 1 samples source 0.5: halfway between 0 and 10.
        assert_eq!(up.pixel(1, 0).unwrap()[0], 5);
        assert_eq!(up.pixel(2, 0).unwrap()[0], 10);
        // The last column back-projects past the edge and is transparent.
        assert_eq!(up.pixel(7, 0), Some([0; 4]));
    }

    #[test]
    fn test_shrink_averages_flat_color() {
        let mut img = Image::new(8, 8).unwrap();
        img.fill([90, 60, 30, 255]);
        let down = scale(&img, 0.5).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                let px = down.pixel(x, y).unwrap();
                for (got, want) in px.iter().zip([90u8, 60, 30, 255]) {
                    assert!((*got as i32 - want as i32).abs() <= 1, "{px:?}");
                }
            }
        }
    }

    #[test]
    fn test_bilinear_4points_outside() {
        let src = [255u8; 16];
        assert_eq!(bilinear_4points(&src, 2, 2, -0.6, 0.0), [0; 4]);
        assert_eq!(bilinear_4points(&src, 2, 2, 1.5, 0.0), [0; 4]);
        assert_eq!(bilinear_4points(&src, 2, 2, -0.25, 1.0), [255; 4]);
    }

    #[test]
    fn test_bilinear_pane_covers_box() {
        // 2x2 source, 4x averaging box centered on the middle.
        let src = [0, 0, 0, 0, 100, 100, 100, 100, 100, 100, 100, 100, 0, 0, 0, 0];
        let px = bilinear_pane(&src, 2, 2, 0.5, 0.5, 1.0 / 1.5);
        assert!(px[0] >= 45 && px[0] <= 50, "{px:?}");
    }

    #[test]
    fn test_rotated_size() {
        assert_eq!(rotated_size(0.0, 40, 20), (40, 20));
        assert_eq!(rotated_size(90.0, 40, 20), (20, 40));
        assert_eq!(rotated_size(180.0, 40, 20), (40, 20));
        assert_eq!(rotated_size(45.0, 10, 10), (14, 14));
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let img = ramp(5, 4);
        for quality in [Interpolation::Nearest, Interpolation::Bilinear] {
            let out = rotate(&img, 0.0, quality).unwrap();
            assert_eq!(out.pixels(), img.pixels());
        }
    }

    #[test]
    fn test_rotate_90_moves_corner() {
        let mut img = Image::new(3, 2).unwrap();
        img.set_pixel(0, 1, [255, 0, 0, 255]);
        let out = rotate(&img, 90.0, Interpolation::Nearest).unwrap();
        assert_eq!((out.width(), out.height()), (2, 3));
        assert_eq!(map_point(&img, 90.0, 0, 0), (2, 0));
        assert_eq!(map_point(&img, 90.0, 0, 1), (1, 0));
        assert_eq!(out.pixel(1, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_rotate_corners_transparent() {
        let mut img = Image::new(10, 10).unwrap();
        img.fill([1, 2, 3, 255]);
        let out = rotate(&img, 45.0, Interpolation::Bilinear).unwrap();
        assert_eq!(out.pixel(0, 0), Some([0; 4]));
        let c = out.width() / 2;
        assert!(out.pixel(c, c).unwrap()[3] >= 254);
    }

    #[test]
    fn test_scale_output_size_is_bounded() {
        let img = Image::new(100, 100).unwrap();
        // 20000 x 20000 passes the per-side limit but not the total one.
        assert!(matches!(scale(&img, 200.0), Err(Error::ResourceExhausted(_))));
        assert!(matches!(scale(&img, 1e9), Err(Error::ResourceExhausted(_))));
    }

    #[test]
    fn test_rotate_empty_image() {
        let img = Image::new(0, 0).unwrap();
        let out = rotate(&img, 30.0, Interpolation::Nearest).unwrap();
        assert!(out.is_empty());
        assert!(rotate(&img, f64::INFINITY, Interpolation::Nearest).is_err());
    }
}
