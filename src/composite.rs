//! Region clipping, alpha compositing, extraction and mirroring.
//!
//! Geometry comes from the caller, so nothing here fails on bad coordinates:
//! regions are clipped to the images involved and an empty result is a no-op.

use crate::error::Result;
use crate::image::Image;

/// A clipped, non-empty rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left column.
    pub x: usize,
    /// Top row.
    pub y: usize,
    /// Width in pixels, at least 1.
    pub width: usize,
    /// Height in pixels, at least 1.
    pub height: usize,
}

/// Clip one axis: returns the adjusted start and length, or `None` when
/// nothing is left.
fn confine_axis(start: i64, len: i64, max: i64) -> Option<(i64, i64)> {
    let (mut t, mut r) = (start, len);
    if t < 0 {
        r += t;
        t = 0;
    }
    if t + r > max {
        r = max - t;
    }
    (r > 0).then_some((t, r))
}

/// Clip the region `(x, y, width, height)` to `image`'s bounds.
///
/// Returns `None` when the clipped region is empty.
pub fn confine(image: &Image, x: i32, y: i32, width: i32, height: i32) -> Option<Rect> {
    let (x, w) = confine_axis(x as i64, width as i64, image.width() as i64)?;
    let (y, h) = confine_axis(y as i64, height as i64, image.height() as i64)?;
    Some(Rect {
        x: x as usize,
        y: y as usize,
        width: w as usize,
        height: h as usize,
    })
}

/// Clip a source region and its destination position against both images.
///
/// Returns `(dst_x, dst_y, src_rect)` with the shifts applied on each side.
#[allow(clippy::too_many_arguments)]
fn confine_pair(
    dst: &Image,
    src: &Image,
    dst_x: i32,
    dst_y: i32,
    src_x: i32,
    src_y: i32,
    width: i32,
    height: i32,
) -> Option<(usize, usize, Rect)> {
    let s = confine(src, src_x, src_y, width, height)?;
    let dx = dst_x as i64 + (s.x as i64 - src_x as i64);
    let dy = dst_y as i64 + (s.y as i64 - src_y as i64);
    let (cx, w) = confine_axis(dx, s.width as i64, dst.width() as i64)?;
    let (cy, h) = confine_axis(dy, s.height as i64, dst.height() as i64)?;
    let rect = Rect {
        x: (s.x as i64 + (cx - dx)) as usize,
        y: (s.y as i64 + (cy - dy)) as usize,
        width: w as usize,
        height: h as usize,
    };
    Some((cx as usize, cy as usize, rect))
}

/// Porter-Duff "over" for one straight-alpha pixel.
#[inline]
pub fn blend_pixel(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let a_src = src[3] as u32;
    let a_dst = dst[3] as u32;
    let a_res = a_src + a_dst * (255 - a_src) / 255;
    if a_res == 0 {
        return [0; 4];
    }
    let mix = |s: u8, d: u8| {
        ((s as u32 * a_src + d as u32 * a_dst * (255 - a_src) / 255) / a_res).min(255) as u8
    };
    [
        mix(src[0], dst[0]),
        mix(src[1], dst[1]),
        mix(src[2], dst[2]),
        a_res as u8,
    ]
}

fn comp_rows<F>(dst: &mut Image, src: &Image, dst_x: usize, dst_y: usize, s: Rect, mut op: F)
where
    F: FnMut(&[u8], &mut [u8]),
{
    let row_len = s.width * 4;
    for j in 0..s.height {
        let so = src.offset(s.x, s.y + j);
        let d_o = dst.offset(dst_x, dst_y + j);
        op(
            &src.pixels()[so..so + row_len],
            &mut dst.pixels_mut()[d_o..d_o + row_len],
        );
    }
}

/// Superimpose `src` onto `dst` with its top-left corner at `(dst_x, dst_y)`.
///
/// Sources with alpha are composited with [`blend_pixel`]; opaque sources
/// are copied. Only the overlapping region is touched.
pub fn blend(dst: &mut Image, src: &Image, dst_x: i32, dst_y: i32) {
    let (w, h) = (src.width() as i32, src.height() as i32);
    blend_sub(dst, src, dst_x, dst_y, 0, 0, w, h);
}

/// [`blend`] restricted to the source region `(src_x, src_y, width, height)`.
#[allow(clippy::too_many_arguments)]
pub fn blend_sub(
    dst: &mut Image,
    src: &Image,
    dst_x: i32,
    dst_y: i32,
    src_x: i32,
    src_y: i32,
    width: i32,
    height: i32,
) {
    let Some((dx, dy, s)) = confine_pair(dst, src, dst_x, dst_y, src_x, src_y, width, height)
    else {
        log::trace!("blend: empty region at ({dst_x},{dst_y})");
        return;
    };
    if src.has_alpha() {
        comp_rows(dst, src, dx, dy, s, |s_row, d_row| {
            for (sp, dp) in s_row.chunks_exact(4).zip(d_row.chunks_exact_mut(4)) {
                let out = blend_pixel(
                    [sp[0], sp[1], sp[2], sp[3]],
                    [dp[0], dp[1], dp[2], dp[3]],
                );
                dp.copy_from_slice(&out);
            }
        });
    } else {
        comp_rows(dst, src, dx, dy, s, |s_row, d_row| d_row.copy_from_slice(s_row));
    }
}

/// Copy `src` onto `dst` ignoring alpha, clipped to both images.
pub fn comp_over(dst: &mut Image, src: &Image, dst_x: i32, dst_y: i32) {
    let (w, h) = (src.width() as i32, src.height() as i32);
    if let Some((dx, dy, s)) = confine_pair(dst, src, dst_x, dst_y, 0, 0, w, h) {
        comp_rows(dst, src, dx, dy, s, |s_row, d_row| d_row.copy_from_slice(s_row));
    }
}

/// Copy a region into a new image, keeping the alpha flag and opacity.
///
/// Returns `Ok(None)` when the region lies entirely outside `image`.
pub fn extract(image: &Image, x: i32, y: i32, width: i32, height: i32) -> Result<Option<Image>> {
    let Some(r) = confine(image, x, y, width, height) else {
        return Ok(None);
    };
    let mut out = Image::new(r.width as u32, r.height as u32)?;
    out.set_has_alpha(image.has_alpha());
    out.set_opacity(image.opacity());
    let row_len = r.width * 4;
    for (j, row) in out.pixels_mut().chunks_exact_mut(row_len).enumerate() {
        let o = image.offset(r.x, r.y + j);
        row.copy_from_slice(&image.pixels()[o..o + row_len]);
    }
    Ok(Some(out))
}

/// Reverse every row (left becomes right).
pub fn mirror_v(image: &Image) -> Image {
    let mut out = image.clone();
    let row_len = image.width() as usize * 4;
    if row_len > 0 {
        for (dst_row, src_row) in out
            .pixels_mut()
            .chunks_exact_mut(row_len)
            .zip(image.pixels().chunks_exact(row_len))
        {
            for (d, s) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4).rev()) {
                d.copy_from_slice(s);
            }
        }
    }
    out
}

/// Reverse the row order (top becomes bottom).
pub fn mirror_h(image: &Image) -> Image {
    let mut out = image.clone();
    let row_len = image.width() as usize * 4;
    if row_len > 0 {
        for (dst, src) in out
            .pixels_mut()
            .chunks_exact_mut(row_len)
            .zip(image.pixels().chunks_exact(row_len).rev())
        {
            dst.copy_from_slice(src);
        }
    }
    out
}
