//! Hand-assembled PNG streams.
//!
//! Encoders rarely emit interlacing, every filter type, or colour-key
//! transparency, so these helpers build such files chunk by chunk.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub const GRAY: u8 = 0;
pub const RGB: u8 = 2;
pub const PALETTE: u8 = 3;
pub const GRAY_ALPHA: u8 = 4;
pub const RGBA: u8 = 6;

/// Bytes per pixel for an 8-bit color type.
pub fn bytes_per_pixel(color_type: u8) -> usize {
    match color_type {
        GRAY | PALETTE => 1,
        GRAY_ALPHA => 2,
        RGB => 3,
        RGBA => 4,
        other => panic!("bad color type {other}"),
    }
}

/// Append a chunk with its CRC.
pub fn chunk(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);
    let mut crc = Crc::new();
    crc.update(tag);
    crc.update(payload);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

pub fn ihdr(width: u32, height: u32, color_type: u8, interlace: bool) -> Vec<u8> {
    let mut p = Vec::with_capacity(13);
    p.extend_from_slice(&width.to_be_bytes());
    p.extend_from_slice(&height.to_be_bytes());
    p.extend_from_slice(&[8, color_type, 0, 0, interlace as u8]);
    p
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// A zlib stream made only of maximum-size stored blocks.
pub fn stored_zlib(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x78, 0x01];
    let blocks: Vec<&[u8]> = if data.is_empty() {
        vec![&[][..]]
    } else {
        data.chunks(65535).collect()
    };
    for (i, block) in blocks.iter().enumerate() {
        out.push((i + 1 == blocks.len()) as u8);
        let len = block.len() as u16;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(block);
    }
    out.extend_from_slice(&pixkit::decode::inflate::adler32(data).to_be_bytes());
    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Filter a `width` x `height` image of `bpp`-byte pixels, choosing the
/// filter type for each row with `pick(row_index)`.
pub fn filter_image(
    pixels: &[u8],
    width: usize,
    height: usize,
    bpp: usize,
    pick: impl Fn(usize) -> u8,
) -> Vec<u8> {
    let stride = width * bpp;
    let zero = vec![0u8; stride];
    let mut out = Vec::with_capacity((stride + 1) * height);
    for y in 0..height {
        let row = &pixels[y * stride..(y + 1) * stride];
        let prior = if y == 0 {
            &zero[..]
        } else {
            &pixels[(y - 1) * stride..y * stride]
        };
        let f = pick(y);
        out.push(f);
        for i in 0..stride {
            let a = if i >= bpp { row[i - bpp] } else { 0 };
            let b = prior[i];
            let c = if i >= bpp { prior[i - bpp] } else { 0 };
            let predicted = match f {
                0 => 0,
                1 => a,
                2 => b,
                3 => ((a as u16 + b as u16) / 2) as u8,
                4 => paeth(a, b, c),
                other => panic!("bad filter {other}"),
            };
            out.push(row[i].wrapping_sub(predicted));
        }
    }
    out
}

const ADAM7: [(usize, usize, usize, usize); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

/// Split an image into its seven Adam7 passes and filter each one.
pub fn adam7_image(
    pixels: &[u8],
    width: usize,
    height: usize,
    bpp: usize,
    pick: impl Fn(usize) -> u8,
) -> Vec<u8> {
    let mut out = Vec::new();
    for (x0, y0, dx, dy) in ADAM7 {
        if width <= x0 || height <= y0 {
            continue;
        }
        let pw = (width - x0 + dx - 1) / dx;
        let ph = (height - y0 + dy - 1) / dy;
        let mut pass = Vec::with_capacity(pw * ph * bpp);
        for j in 0..ph {
            for i in 0..pw {
                let o = ((y0 + j * dy) * width + x0 + i * dx) * bpp;
                pass.extend_from_slice(&pixels[o..o + bpp]);
            }
        }
        out.extend_from_slice(&filter_image(&pass, pw, ph, bpp, &pick));
    }
    out
}

/// Chunk-level description of a PNG file.
pub struct PngFile {
    pub width: u32,
    pub height: u32,
    pub color_type: u8,
    pub interlace: bool,
    /// Chunks placed between IHDR and the image data.
    pub before_idat: Vec<([u8; 4], Vec<u8>)>,
    /// Compressed image data.
    pub zdata: Vec<u8>,
    /// Number of IDAT chunks the compressed data is split into.
    pub idat_chunks: usize,
}

impl PngFile {
    pub fn new(width: u32, height: u32, color_type: u8, zdata: Vec<u8>) -> Self {
        Self {
            width,
            height,
            color_type,
            interlace: false,
            before_idat: Vec::new(),
            zdata,
            idat_chunks: 1,
        }
    }

    pub fn with_chunk(mut self, tag: &[u8; 4], payload: Vec<u8>) -> Self {
        self.before_idat.push((*tag, payload));
        self
    }

    pub fn interlaced(mut self) -> Self {
        self.interlace = true;
        self
    }

    pub fn split_idat(mut self, n: usize) -> Self {
        self.idat_chunks = n.max(1);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        chunk(
            &mut out,
            b"IHDR",
            &ihdr(self.width, self.height, self.color_type, self.interlace),
        );
        for (tag, payload) in &self.before_idat {
            chunk(&mut out, tag, payload);
        }
        let per = (self.zdata.len() + self.idat_chunks - 1) / self.idat_chunks;
        for part in self.zdata.chunks(per.max(1)) {
            chunk(&mut out, b"IDAT", part);
        }
        chunk(&mut out, b"IEND", &[]);
        out
    }
}
