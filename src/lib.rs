//! # pixkit
//!
//! Raster image decoding and RGBA compositing with a minimal dependency
//! footprint.
//!
//! The decoders are written from scratch, including the DEFLATE inflater,
//! both Huffman flavors and the JPEG IDCT:
//!
//! - **JPEG**: baseline, Huffman coded, any sampling factors up to 4x4
//! - **PNG**: 8-bit, every color type, Adam7 interlacing, palette and
//!   color-key transparency
//! - **GIF**: first frame of 87a/89a streams, interlaced or not
//! - **BMP**: uncompressed 4/8/16/24/32-bit, including bitfield masks
//!
//! Decoded images feed a small compositing engine: alpha blending, region
//! extraction, mirroring, bilinear scaling and arbitrary rotation, plus a
//! [`Surface`](surface::Surface) abstraction for pushing RGBA rectangles to
//! an output.
//!
//! ## Features
//!
//! - `parallel`: row-parallel `scale` and `rotate` via rayon
//! - `cli`: the `pixkit` command-line tool
//!
//! ## Example
//!
//! ```rust
//! use pixkit::{composite, transform, Image};
//!
//! let mut backdrop = Image::new(64, 64).unwrap();
//! backdrop.fill([20, 40, 80, 255]);
//!
//! let mut sprite = Image::new(16, 16).unwrap();
//! sprite.fill([255, 255, 255, 128]);
//! sprite.set_has_alpha(true);
//!
//! composite::blend(&mut backdrop, &sprite, 8, 8);
//! let thumb = transform::scale(&backdrop, 0.25).unwrap();
//! assert_eq!((thumb.width(), thumb.height()), (16, 16));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod color;
pub mod composite;
pub mod config;
pub mod decode;
pub mod error;
pub mod image;
pub mod surface;
pub mod transform;

pub use color::ColorType;
pub use config::DecodeConfig;
pub use decode::{
    decode, decode_with, guess_format, probe, probe_with, Decoded, Format, ImageInfo, Source,
};
pub use error::{Error, Result};
pub use image::Image;
pub use surface::{BlitMode, Surface};
pub use transform::Interpolation;
