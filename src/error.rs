//! Error types for the pixkit library.

use std::fmt;

/// Result type alias for pixkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or compositing images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The signature did not match the decoder being tried.
    ///
    /// Used internally by the format sniffer to move on to the next decoder;
    /// callers of [`crate::decode`] only see it when no decoder matched.
    FormatMismatch,
    /// Malformed header field, inconsistent length, bad Huffman/LZW code,
    /// or truncated data.
    CorruptStream(String),
    /// A well-formed stream using a feature this crate does not decode
    /// (progressive JPEG, non-8-bit PNG, RLE or 1-bit BMP, ...).
    UnsupportedVariant(String),
    /// An allocation would exceed addressable size.
    ResourceExhausted(String),
    /// Invalid image dimensions.
    InvalidDimensions {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },
    /// A caller-supplied argument is out of range.
    InvalidParameter(String),
    /// Failure reading a file or stream.
    Io(String),
}

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptStream(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedVariant(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FormatMismatch => {
                write!(f, "Image not of any known type, or corrupt")
            }
            Error::CorruptStream(msg) => {
                write!(f, "Corrupt image data: {}", msg)
            }
            Error::UnsupportedVariant(msg) => {
                write!(f, "Unsupported image variant: {}", msg)
            }
            Error::ResourceExhausted(msg) => {
                write!(f, "Out of memory: {}", msg)
            }
            Error::InvalidDimensions { width, height } => {
                write!(f, "Invalid image dimensions: {}x{}", width, height)
            }
            Error::InvalidParameter(msg) => {
                write!(f, "Invalid parameter: {}", msg)
            }
            Error::Io(msg) => {
                write!(f, "I/O error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Compute `a * b * c` as a buffer size, failing instead of overflowing.
pub(crate) fn checked_size(a: usize, b: usize, c: usize) -> Result<usize> {
    a.checked_mul(b)
        .and_then(|v| v.checked_mul(c))
        .ok_or_else(|| Error::ResourceExhausted(format!("{a}x{b}x{c} buffer is too large")))
}

/// Largest pixel buffer a decoder or transform will allocate, in bytes.
pub(crate) const MAX_IMAGE_BYTES: usize = 1 << 30;

/// Byte size of a `width` x `height` image with `channels` samples per pixel.
///
/// Fails with [`Error::ResourceExhausted`] above [`MAX_IMAGE_BYTES`].
pub(crate) fn image_size(width: usize, height: usize, channels: usize) -> Result<usize> {
    let size = checked_size(width, height, channels)?;
    if size > MAX_IMAGE_BYTES {
        return Err(Error::ResourceExhausted(format!(
            "{width}x{height}x{channels} image is too large to decode"
        )));
    }
    Ok(size)
}
