//! The RGBA image entity used by the compositing engine.
//!
//! An [`Image`] owns a tightly packed `width * height * 4` buffer (R, G, B, A
//! per pixel, row-major) plus two display properties: whether the alpha
//! channel is meaningful and the opacity threshold used when painting with
//! [`BlitMode::Threshold`](crate::surface::BlitMode::Threshold).

use std::fmt;
use std::fs::File;
use std::path::Path;

use crate::color::ColorType;
use crate::composite::{confine, Rect};
use crate::config::DecodeConfig;
use crate::decode::{decode_with, Source};
use crate::error::{checked_size, Error, Result};
use crate::surface::BlitMode;

/// Default opacity threshold for new images.
pub const DEFAULT_OPACITY: u8 = 128;

/// An owned RGBA image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    has_alpha: bool,
    opacity: u8,
}

impl Image {
    /// Create a `width` x `height` image with every byte zero.
    ///
    /// A zero dimension gives an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] when the buffer size overflows.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = checked_size(width as usize, height as usize, 4)?;
        Ok(Self {
            width,
            height,
            pixels: vec![0; len],
            has_alpha: false,
            opacity: DEFAULT_OPACITY,
        })
    }

    /// Wrap an existing RGBA buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when `pixels` is not exactly
    /// `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = checked_size(width as usize, height as usize, 4)?;
        if pixels.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "expected {expected} bytes for {width}x{height} RGBA, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            has_alpha: false,
            opacity: DEFAULT_OPACITY,
        })
    }

    /// Decode an image file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, &DecodeConfig::default())
    }

    /// [`Image::load`] with an explicit decode configuration.
    pub fn load_with(path: impl AsRef<Path>, config: &DecodeConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| config.report(e.into()))?;
        let image = Self::decode_with(Source::File(&mut file), config)?;
        log::debug!(
            "loaded {}: {}x{} has_alpha={}",
            path.display(),
            image.width,
            image.height,
            image.has_alpha
        );
        Ok(image)
    }

    /// Decode an in-memory file.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_with(Source::Memory(data), &DecodeConfig::default())
    }

    /// Decode any source to RGBA. `has_alpha` is set when the source carries
    /// an alpha channel.
    pub fn decode_with(source: Source<'_>, config: &DecodeConfig) -> Result<Self> {
        let decoded = decode_with(source, 4, config)?;
        let has_alpha = ColorType::from_channels(decoded.channels)
            .map(ColorType::has_alpha)
            .unwrap_or(false);
        let mut image = Self::from_rgba(decoded.width, decoded.height, decoded.pixels)?;
        image.has_alpha = has_alpha;
        Ok(image)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable RGBA bytes.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Consume the image, returning its buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Whether the alpha channel is honored when blending and painting.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Set whether the alpha channel is honored.
    pub fn set_has_alpha(&mut self, has_alpha: bool) {
        self.has_alpha = has_alpha;
    }

    /// Opacity threshold for [`BlitMode::Threshold`].
    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    /// Set the opacity threshold.
    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }

    /// How this image is prepared for a surface by default.
    pub fn blit_mode(&self) -> BlitMode {
        if self.has_alpha {
            BlitMode::Threshold(self.opacity)
        } else {
            BlitMode::Opaque
        }
    }

    #[inline]
    pub(crate) fn offset(&self, x: usize, y: usize) -> usize {
        (y * self.width as usize + x) * 4
    }

    /// RGBA value at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let o = self.offset(x as usize, y as usize);
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[o..o + 4]);
        Some(px)
    }

    /// Set the pixel at `(x, y)`; coordinates outside the image are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x < self.width && y < self.height {
            let o = self.offset(x as usize, y as usize);
            self.pixels[o..o + 4].copy_from_slice(&rgba);
        }
    }

    /// Set every pixel to `rgba`.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Display adapter printing the RGBA values of a region as a table.
    ///
    /// The region is clipped to the image; an empty region prints nothing.
    pub fn dump(&self, x: i32, y: i32, width: i32, height: i32) -> Dump<'_> {
        Dump {
            image: self,
            region: confine(self, x, y, width, height),
        }
    }
}

/// Table view of an image region, created by [`Image::dump`].
pub struct Dump<'a> {
    image: &'a Image,
    region: Option<Rect>,
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(r) = self.region else {
            return Ok(());
        };
        let img = self.image;
        writeln!(
            f,
            "Image: width {}  height {}  has_alpha {}  opacity {}",
            img.width, img.height, img.has_alpha, img.opacity
        )?;
        writeln!(
            f,
            "Region: src_x {}  src_y {}  width {}  height {}",
            r.x, r.y, r.width, r.height
        )?;

        write!(f, " y,x ")?;
        for x in r.x..r.x + r.width {
            write!(f, "|      {x:4}      ")?;
        }
        writeln!(f)?;

        for y in r.y..r.y + r.height {
            write!(f, "{y:4} ")?;
            for x in r.x..r.x + r.width {
                let o = img.offset(x, y);
                let p = &img.pixels[o..o + 4];
                write!(f, "| {:3} {:3} {:3} {:3}", p[0], p[1], p[2], p[3])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
