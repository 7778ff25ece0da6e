//! Format-agnostic decoding.
//!
//! [`decode`] and [`probe`] sniff the input against each supported format in
//! a fixed order (JPEG, PNG, BMP, GIF), rewinding between attempts, then hand
//! the stream to the matching decoder.
//!
//! # Example
//!
//! ```no_run
//! use pixkit::decode::{decode, Source};
//!
//! let bytes = std::fs::read("photo.jpg")?;
//! let img = decode(Source::Memory(&bytes), 4)?;
//! assert_eq!(img.pixels.len(), (img.width * img.height * 4) as usize);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bit_reader;
pub mod bmp;
pub mod gif;
pub mod huffman;
pub mod idct;
pub mod inflate;
pub mod jpeg;
pub mod png;
pub mod reader;

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::config::DecodeConfig;
use crate::error::{Error, Result};
use reader::ByteReader;

/// Image container formats recognised by the sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Baseline JPEG (JFIF).
    Jpeg,
    /// 8-bit PNG.
    Png,
    /// Uncompressed Windows bitmap.
    Bmp,
    /// GIF 87a/89a, first frame.
    Gif,
}

impl Format {
    /// Probe order used by [`decode`] and [`probe`].
    pub const ALL: [Format; 4] = [Format::Jpeg, Format::Png, Format::Bmp, Format::Gif];

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Bmp => "bmp",
            Format::Gif => "gif",
        }
    }

    fn test(self, reader: &mut ByteReader) -> bool {
        match self {
            Format::Jpeg => jpeg::test(reader),
            Format::Png => png::test(reader),
            Format::Bmp => bmp::test(reader),
            Format::Gif => gif::test(reader),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header summary returned by [`probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Native channel count.
    pub channels: usize,
}

/// A decoded pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Interleaved 8-bit samples, row-major with no padding. Holds the
    /// requested number of channels, or [`channels`](Self::channels) when
    /// zero was requested.
    pub pixels: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Native channel count of the source, regardless of conversion.
    pub channels: usize,
}

impl Decoded {
    /// True when no image was present (a GIF that ends before its first
    /// image block).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where encoded bytes come from.
pub enum Source<'a> {
    /// A complete in-memory file.
    Memory(&'a [u8]),
    /// An open file, read from its current position.
    File(&'a mut File),
    /// Any pull source.
    Reader(&'a mut dyn Read),
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Memory(data) => f.debug_tuple("Memory").field(&data.len()).finish(),
            Source::File(file) => f.debug_tuple("File").field(file).finish(),
            Source::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Identify the format of an in-memory file by its signature.
pub fn guess_format(data: &[u8]) -> Option<Format> {
    sniff(&mut ByteReader::from_slice(data))
}

/// Try each format test in order, rewinding after every attempt.
fn sniff(reader: &mut ByteReader) -> Option<Format> {
    reader.retain(true);
    let mut found = None;
    for format in Format::ALL {
        let matched = format.test(reader);
        reader.rewind();
        if matched {
            found = Some(format);
            break;
        }
    }
    reader.retain(false);
    found
}

fn decode_reader(reader: &mut ByteReader, req: usize, config: &DecodeConfig) -> Result<Decoded> {
    if req > 4 {
        return Err(Error::unsupported(format!("{req} requested channels")));
    }
    let format = sniff(reader).ok_or(Error::FormatMismatch)?;
    log::debug!("decoding {format} with {req} requested channels");
    match format {
        Format::Jpeg => jpeg::decode(reader, req),
        Format::Png => png::decode(reader, req, config.png_partial),
        Format::Bmp => bmp::decode(reader, req),
        Format::Gif => match gif::decode(reader, req)? {
            Some(decoded) => Ok(decoded),
            None => {
                log::debug!("gif stream has no image");
                Ok(Decoded {
                    pixels: Vec::new(),
                    width: 0,
                    height: 0,
                    channels: 4,
                })
            }
        },
    }
}

fn probe_reader(reader: &mut ByteReader) -> Result<ImageInfo> {
    let format = sniff(reader).ok_or(Error::FormatMismatch)?;
    let info = match format {
        Format::Jpeg => jpeg::probe(reader),
        Format::Png => png::probe(reader),
        Format::Bmp => bmp::probe(reader),
        Format::Gif => gif::probe(reader),
    }?;
    log::debug!(
        "probed {format}: {}x{} with {} channels",
        info.width,
        info.height,
        info.channels
    );
    Ok(info)
}

/// Decode with the default configuration.
///
/// `req` selects the output channel count: 0 keeps the native layout, 1 is
/// gray, 2 gray+alpha, 3 RGB and 4 RGBA.
pub fn decode(source: Source<'_>, req: usize) -> Result<Decoded> {
    decode_with(source, req, &DecodeConfig::default())
}

/// Decode with an explicit configuration. Errors pass through the
/// configuration's hook before being returned.
pub fn decode_with(source: Source<'_>, req: usize, config: &DecodeConfig) -> Result<Decoded> {
    let result = match source {
        Source::Memory(data) => decode_reader(&mut ByteReader::from_slice(data), req, config),
        Source::File(file) => decode_reader(&mut ByteReader::from_reader(file), req, config),
        Source::Reader(stream) => decode_reader(&mut ByteReader::from_reader(stream), req, config),
    };
    result.map_err(|e| config.report(e))
}

/// Read dimensions and native channel count without decoding pixels.
pub fn probe(source: Source<'_>) -> Result<ImageInfo> {
    probe_with(source, &DecodeConfig::default())
}

/// [`probe`] with an explicit configuration.
///
/// A [`Source::File`] is returned to the position it had on entry.
pub fn probe_with(source: Source<'_>, config: &DecodeConfig) -> Result<ImageInfo> {
    let result = match source {
        Source::Memory(data) => probe_reader(&mut ByteReader::from_slice(data)),
        Source::Reader(stream) => probe_reader(&mut ByteReader::from_reader(stream)),
        Source::File(file) => probe_file(file),
    };
    result.map_err(|e| config.report(e))
}

fn probe_file(file: &mut File) -> Result<ImageInfo> {
    let start = file.stream_position()?;
    let result = probe_reader(&mut ByteReader::from_reader(&mut *file));
    file.seek(SeekFrom::Start(start))?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn gray_bmp() -> Vec<u8> {
        let mut out = b"BM".to_vec();
        out.extend_from_slice(&58u32.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&54u32.to_le_bytes());
        out.extend_from_slice(&40u32.to_le_bytes());
        out.extend_from_slice(&1i32.to_le_bytes());
        out.extend_from_slice(&1i32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        out.extend_from_slice(&[0; 24]);
        out.extend_from_slice(&[10, 20, 30, 0]);
        out
    }

    #[test]
    fn test_guess_format() {
        assert_eq!(guess_format(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(Format::Jpeg));
        assert_eq!(
            guess_format(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(Format::Png)
        );
        assert_eq!(guess_format(b"GIF89a"), Some(Format::Gif));
        assert_eq!(guess_format(&gray_bmp()), Some(Format::Bmp));
        assert_eq!(guess_format(b"hello world"), None);
        assert_eq!(guess_format(&[]), None);
    }

    #[test]
    fn test_unknown_format_is_mismatch() {
        let err = decode(Source::Memory(b"not an image"), 0).unwrap_err();
        assert_eq!(err, Error::FormatMismatch);
        assert_eq!(err.to_string(), "Image not of any known type, or corrupt");
    }

    #[test]
    fn test_decode_memory_and_reader_agree() {
        let data = gray_bmp();
        let from_memory = decode(Source::Memory(&data), 4).unwrap();
        let mut cursor = Cursor::new(data.clone());
        let from_reader = decode(Source::Reader(&mut cursor), 4).unwrap();
        assert_eq!(from_memory, from_reader);
        assert_eq!(from_memory.pixels, vec![30, 20, 10, 255]);
        assert_eq!(from_memory.channels, 3);
    }

    #[test]
    fn test_probe_reader_after_sniffing() {
        let data = gray_bmp();
        let mut cursor = Cursor::new(data);
        let info = probe(Source::Reader(&mut cursor)).unwrap();
        assert_eq!(info, ImageInfo { width: 1, height: 1, channels: 3 });
    }

    #[test]
    fn test_probe_file_restores_position() {
        let path = std::env::temp_dir().join(format!("pixkit-probe-{}.bmp", std::process::id()));
        File::create(&path).unwrap().write_all(&gray_bmp()).unwrap();

        let mut file = File::open(&path).unwrap();
        let info = probe(Source::File(&mut file)).unwrap();
        assert_eq!((info.width, info.height), (1, 1));
        assert_eq!(file.stream_position().unwrap(), 0);

        let img = decode(Source::File(&mut file), 3).unwrap();
        assert_eq!(img.pixels, vec![30, 20, 10]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_too_many_channels() {
        let data = gray_bmp();
        assert!(matches!(
            decode(Source::Memory(&data), 5),
            Err(Error::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn test_error_hook_sees_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let config = DecodeConfig::new().with_error_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(decode_with(Source::Memory(b"junk"), 0, &config).is_err());
        assert!(probe_with(Source::Memory(b"junk"), &config).is_err());
        assert!(decode_with(Source::Memory(&gray_bmp()), 0, &config).is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_gif_without_image_is_empty() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&[2, 0, 2, 0, 0, 0, 0, 0x3B]);
        let img = decode(Source::Memory(&data), 4).unwrap();
        assert!(img.is_empty());
        assert!(img.pixels.is_empty());
    }
}
