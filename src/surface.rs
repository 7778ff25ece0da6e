//! Output surfaces.
//!
//! A [`Surface`] is anything that accepts an RGBA rectangle at an offset: a
//! window, an off-screen buffer, an encoder. The functions here clip a
//! region of an [`Image`], prepare its pixels for the target according to a
//! [`BlitMode`] and hand the result over in one `blit` call.

use crate::composite::{confine, Rect};
use crate::error::Result;
use crate::image::Image;

/// A target accepting tightly packed RGBA rectangles.
pub trait Surface {
    /// Draw `width` x `height` pixels of `rgba` with the top-left corner at
    /// `(x, y)`. The target clips anything outside its own bounds.
    fn blit(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: &[u8]);
}

/// How image pixels are prepared before they reach a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitMode {
    /// Alpha forced to 255.
    Opaque,
    /// Pixels with alpha at or above the threshold become opaque, the rest
    /// are cleared to transparent black.
    Threshold(u8),
    /// Color channels scaled by alpha.
    Premultiplied,
}

impl BlitMode {
    /// Apply the mode to a buffer of RGBA pixels in place.
    pub fn prepare(self, rgba: &mut [u8]) {
        for px in rgba.chunks_exact_mut(4) {
            match self {
                BlitMode::Opaque => px[3] = 255,
                BlitMode::Threshold(t) => {
                    if px[3] >= t {
                        px[3] = 255;
                    } else {
                        px.fill(0);
                    }
                }
                BlitMode::Premultiplied => {
                    let a = px[3] as u32;
                    for c in &mut px[..3] {
                        *c = (*c as u32 * a / 255) as u8;
                    }
                }
            }
        }
    }
}

/// Copy `r` out of `image` as a packed buffer.
fn copy_region(image: &Image, r: Rect) -> Vec<u8> {
    let mut out = Vec::with_capacity(r.width * r.height * 4);
    for y in r.y..r.y + r.height {
        let start = image.offset(r.x, y);
        out.extend_from_slice(&image.pixels()[start..start + r.width * 4]);
    }
    out
}

/// Paint all of `image` at `(x, y)` using its own [`Image::blit_mode`].
pub fn paint<S: Surface + ?Sized>(surface: &mut S, image: &Image, x: i32, y: i32) {
    paint_sub(
        surface,
        image,
        x,
        y,
        0,
        0,
        image.width() as i32,
        image.height() as i32,
    );
}

/// Paint the `(src_x, src_y, width, height)` region of `image` at `(x, y)`.
#[allow(clippy::too_many_arguments)]
pub fn paint_sub<S: Surface + ?Sized>(
    surface: &mut S,
    image: &Image,
    x: i32,
    y: i32,
    src_x: i32,
    src_y: i32,
    width: i32,
    height: i32,
) {
    let mode = image.blit_mode();
    paint_sub_with(surface, image, x, y, src_x, src_y, width, height, mode);
}

/// [`paint_sub`] with an explicit preparation mode.
///
/// The region is clipped to the image first; the destination moves by the
/// amount clipped from the left and top edges.
#[allow(clippy::too_many_arguments)]
pub fn paint_sub_with<S: Surface + ?Sized>(
    surface: &mut S,
    image: &Image,
    x: i32,
    y: i32,
    src_x: i32,
    src_y: i32,
    width: i32,
    height: i32,
    mode: BlitMode,
) {
    let Some(r) = confine(image, src_x, src_y, width, height) else {
        return;
    };
    let shift = |to: i32, clipped: usize, from: i32| {
        (to as i64 + clipped as i64 - from as i64).clamp(i32::MIN as i64, i32::MAX as i64) as i32
    };
    let (dx, dy) = (shift(x, r.x, src_x), shift(y, r.y, src_y));
    let mut buf = copy_region(image, r);
    mode.prepare(&mut buf);
    log::trace!("paint {}x{} at ({dx}, {dy}) as {mode:?}", r.width, r.height);
    surface.blit(dx, dy, r.width as u32, r.height as u32, &buf);
}

/// An image prepared once for repeated painting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Pixmap {
    /// Prepare `image` with its own [`Image::blit_mode`].
    pub fn from_image(image: &Image) -> Self {
        Self::from_image_with(image, image.blit_mode())
    }

    /// Prepare `image` with an explicit mode.
    pub fn from_image_with(image: &Image, mode: BlitMode) -> Self {
        let mut pixels = image.pixels().to_vec();
        mode.prepare(&mut pixels);
        Self {
            width: image.width(),
            height: image.height(),
            pixels,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Prepared RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Paint the whole pixmap at `(x, y)`.
    pub fn paint<S: Surface + ?Sized>(&self, surface: &mut S, x: i32, y: i32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        surface.blit(x, y, self.width, self.height, &self.pixels);
    }

    /// Repeat the pixmap over the `width` x `height` region at `(x, y)`.
    /// Tiles on the last row and column are cut to fit.
    pub fn tile<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) {
        if self.width == 0 || self.height == 0 || width <= 0 || height <= 0 {
            return;
        }
        let (tw, th) = (self.width as i64, self.height as i64);
        let (width, height) = (width as i64, height as i64);

        let mut ty = 0i64;
        while ty < height {
            let h = th.min(height - ty);
            let mut tx = 0i64;
            while tx < width {
                let w = tw.min(width - tx);
                let (px, py) = ((x as i64 + tx) as i32, (y as i64 + ty) as i32);
                if w == tw && h == th {
                    surface.blit(px, py, self.width, self.height, &self.pixels);
                } else {
                    let part = self.crop(w as usize, h as usize);
                    surface.blit(px, py, w as u32, h as u32, &part);
                }
                tx += tw;
            }
            ty += th;
        }
    }

    /// The top-left `width` x `height` corner.
    fn crop(&self, width: usize, height: usize) -> Vec<u8> {
        let stride = self.width as usize * 4;
        self.pixels
            .chunks_exact(stride)
            .take(height)
            .flat_map(|row| &row[..width * 4])
            .copied()
            .collect()
    }
}

/// An in-memory surface that composites premultiplied RGBA blits.
///
/// Fully opaque pixels replace the destination, fully transparent ones are
/// skipped and anything in between is composited as `src + dst * (255 - a) /
/// 255`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    image: Image,
}

impl Canvas {
    /// A transparent black canvas.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            image: Image::new(width, height)?,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Current RGBA contents.
    pub fn pixels(&self) -> &[u8] {
        self.image.pixels()
    }

    /// One pixel, or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.pixel(x, y)
    }

    /// The contents as an image with a meaningful alpha channel.
    pub fn into_image(self) -> Image {
        let mut image = self.image;
        image.set_has_alpha(true);
        image
    }
}

impl Surface for Canvas {
    fn blit(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: &[u8]) {
        let (w, h) = (width as usize, height as usize);
        if rgba.len() < w.saturating_mul(h).saturating_mul(4) {
            log::debug!("canvas blit of {width}x{height} with only {} bytes", rgba.len());
            return;
        }
        let (Ok(wi), Ok(hi)) = (i32::try_from(width), i32::try_from(height)) else {
            return;
        };
        let Some(r) = confine(&self.image, x, y, wi, hi) else {
            return;
        };
        let sx = (r.x as i64 - x as i64) as usize;
        let sy = (r.y as i64 - y as i64) as usize;

        for row in 0..r.height {
            let src_start = ((sy + row) * w + sx) * 4;
            let src = &rgba[src_start..src_start + r.width * 4];
            let dst_start = self.image.offset(r.x, r.y + row);
            let dst = &mut self.image.pixels_mut()[dst_start..dst_start + r.width * 4];
            for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                match s[3] {
                    255 => d.copy_from_slice(s),
                    0 => {}
                    a => {
                        let keep = 255 - a as u32;
                        for (dc, &sc) in d.iter_mut().zip(s) {
                            *dc = (sc as u32 + *dc as u32 * keep / 255).min(255) as u8;
                        }
                    }
                }
            }
        }
    }
}
