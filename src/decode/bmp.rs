//! Windows BMP decoder.
//!
//! Supports the 12, 40, 56, 108 and 124 byte info headers, 4/8-bit palettes and
//! 16/24/32-bit direct color with optional bit-field masks. RLE and 1-bit
//! images are rejected.

use super::reader::ByteReader;
use super::{Decoded, ImageInfo};
use crate::error::{image_size, Error, Result};

const FILE_HEADER_LEN: usize = 14;
const MAX_DIMENSION: u32 = 1 << 24;

/// Info header sizes we know how to read.
fn is_known_header(size: u32) -> bool {
    matches!(size, 12 | 40 | 56 | 108 | 124)
}

/// Position of the highest set bit, or `-1` for zero.
fn highest_bit(z: u32) -> i32 {
    if z == 0 {
        -1
    } else {
        31 - z.leading_zeros() as i32
    }
}

/// Move a masked channel so its top bit lands on bit 7, then replicate the
/// value downward to fill 8 bits when the channel is narrower.
fn shift_signed(v: u32, shift: i32, bits: u32) -> u8 {
    let v = if shift < 0 {
        v << (-shift) as u32
    } else {
        v >> shift as u32
    };
    let mut result = v;
    let mut z = bits;
    while z > 0 && z < 8 {
        result += v >> z;
        z += bits;
    }
    result as u8
}

#[derive(Debug, Default, Clone, Copy)]
struct Channel {
    mask: u32,
    shift: i32,
    count: u32,
}

impl Channel {
    fn new(mask: u32) -> Self {
        Self {
            mask,
            shift: highest_bit(mask) - 7,
            count: mask.count_ones(),
        }
    }

    #[inline]
    fn extract(&self, v: u32) -> u8 {
        shift_signed(v & self.mask, self.shift, self.count)
    }
}

struct Header {
    offset: usize,
    header_size: usize,
    width: usize,
    height: usize,
    flip: bool,
    bpp: u16,
    masks: [u32; 4],
}

struct BmpDecoder<'r, 'a> {
    reader: &'r mut ByteReader<'a>,
    consumed: usize,
}

impl<'r, 'a> BmpDecoder<'r, 'a> {
    fn new(reader: &'r mut ByteReader<'a>) -> Self {
        Self {
            reader,
            consumed: 0,
        }
    }

    fn u8(&mut self) -> u8 {
        self.consumed += 1;
        self.reader.get_u8()
    }

    fn u16(&mut self) -> u16 {
        self.consumed += 2;
        self.reader.get_u16le()
    }

    fn u32(&mut self) -> u32 {
        self.consumed += 4;
        self.reader.get_u32le()
    }

    fn skip(&mut self, n: usize) {
        self.consumed += n;
        self.reader.skip(n);
    }

    /// File header plus the info header size. Returns `(offset, size)`.
    fn read_prefix(&mut self) -> Result<(usize, u32)> {
        if self.u8() != b'B' || self.u8() != b'M' {
            return Err(Error::corrupt("not BMP"));
        }
        self.u32(); // file size
        self.u16(); // reserved
        self.u16(); // reserved
        let offset = self.u32() as usize;
        let size = self.u32();
        if !is_known_header(size) {
            return Err(Error::unsupported(format!("BMP info header of {size} bytes")));
        }
        Ok((offset, size))
    }

    fn read_header(&mut self) -> Result<Header> {
        let (offset, size) = self.read_prefix()?;
        let (width, raw_height) = if size == 12 {
            (self.u16() as i32, self.u16() as i16 as i32)
        } else {
            (self.u32() as i32, self.u32() as i32)
        };
        if self.u16() != 1 {
            return Err(Error::corrupt("bad BMP planes"));
        }
        let bpp = self.u16();
        if bpp == 1 {
            return Err(Error::unsupported("1-bit monochrome BMP"));
        }
        let height = raw_height.unsigned_abs();
        if width <= 0 || height == 0 {
            return Err(Error::InvalidDimensions {
                width: width.max(0) as u32,
                height,
            });
        }
        let width = width as u32;
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(Error::ResourceExhausted("very large image".into()));
        }

        let mut masks = [0u32; 4];
        if size != 12 {
            let compression = self.u32();
            if compression == 1 || compression == 2 {
                return Err(Error::unsupported("RLE-compressed BMP"));
            }
            for _ in 0..5 {
                self.u32(); // image size, resolution, colors used/important
            }
            if size == 108 || size == 124 {
                for m in &mut masks {
                    *m = self.u32();
                }
                self.u32(); // color space type
                self.skip(36 + 12); // endpoints and gamma
                if size == 124 {
                    self.skip(16); // intent, profile offset and size, reserved
                }
            } else {
                if size == 56 {
                    for _ in 0..4 {
                        self.u32();
                    }
                }
                if bpp == 16 || bpp == 32 {
                    match compression {
                        0 if bpp == 32 => masks = [0xFF << 16, 0xFF << 8, 0xFF, 0xFF << 24],
                        0 => masks = [31 << 10, 31 << 5, 31, 0],
                        3 => {
                            masks[0] = self.u32();
                            masks[1] = self.u32();
                            masks[2] = self.u32();
                            if masks[0] == masks[1] && masks[1] == masks[2] {
                                return Err(Error::corrupt("bad BMP masks"));
                            }
                        }
                        other => {
                            return Err(Error::unsupported(format!("BMP compression {other}")));
                        }
                    }
                }
            }
        }

        log::debug!(
            "bmp {width}x{height} {bpp} bpp header {size} top_down={}",
            raw_height < 0
        );
        Ok(Header {
            offset,
            header_size: size as usize,
            width: width as usize,
            height: height as usize,
            flip: raw_height > 0,
            bpp,
            masks,
        })
    }

    /// Skip to the pixel data at the file's declared offset.
    fn seek_pixels(&mut self, offset: usize) -> Result<()> {
        if offset < self.consumed {
            return Err(Error::corrupt("bad BMP data offset"));
        }
        self.skip(offset - self.consumed);
        Ok(())
    }

    fn load_paletted(&mut self, h: &Header, out: &mut [u8], target: usize) -> Result<()> {
        let entry_len = if h.header_size == 12 { 3 } else { 4 };
        let palette_len = h
            .offset
            .saturating_sub(FILE_HEADER_LEN + h.header_size)
            / entry_len;
        if palette_len == 0 || palette_len > 256 {
            return Err(Error::corrupt("bad BMP palette size"));
        }
        let mut palette = [[0u8; 3]; 256];
        for entry in palette.iter_mut().take(palette_len) {
            let b = self.u8();
            let g = self.u8();
            let r = self.u8();
            *entry = [r, g, b];
            if entry_len == 4 {
                self.u8();
            }
        }
        self.seek_pixels(h.offset)?;

        let row_bytes = match h.bpp {
            4 => (h.width + 1) >> 1,
            8 => h.width,
            other => return Err(Error::unsupported(format!("{other}-bit paletted BMP"))),
        };
        let pad = row_bytes.wrapping_neg() & 3;

        for row in out.chunks_exact_mut(h.width * target) {
            let mut pixels = row.chunks_exact_mut(target);
            let mut i = 0;
            while i < h.width {
                let byte = self.u8();
                let indices = if h.bpp == 4 {
                    [byte >> 4, byte & 15]
                } else {
                    [byte, 0]
                };
                let take = if h.bpp == 4 { 2 } else { 1 };
                for &index in indices.iter().take(take) {
                    if i == h.width {
                        break;
                    }
                    if let Some(px) = pixels.next() {
                        px[..3].copy_from_slice(&palette[index as usize]);
                        if target == 4 {
                            px[3] = 255;
                        }
                    }
                    i += 1;
                }
            }
            self.skip(pad);
        }
        Ok(())
    }

    fn load_direct(&mut self, h: &Header, out: &mut [u8], target: usize) -> Result<()> {
        self.seek_pixels(h.offset)?;
        let row_bytes = match h.bpp {
            24 => 3 * h.width,
            16 => 2 * h.width,
            32 => 0,
            other => return Err(Error::unsupported(format!("{other}-bit BMP"))),
        };
        let pad = row_bytes.wrapping_neg() & 3;
        let [mr, mg, mb, ma] = h.masks;
        let easy_bgra = h.bpp == 32
            && mb == 0xFF
            && mg == 0xFF00
            && mr == 0x00FF_0000
            && ma == 0xFF00_0000;
        let easy = h.bpp == 24 || easy_bgra;
        if !easy && (mr == 0 || mg == 0 || mb == 0) {
            return Err(Error::corrupt("bad BMP masks"));
        }
        let channels = [
            Channel::new(mr),
            Channel::new(mg),
            Channel::new(mb),
            Channel::new(ma),
        ];

        for row in out.chunks_exact_mut(h.width * target) {
            for px in row.chunks_exact_mut(target) {
                if easy {
                    px[2] = self.u8();
                    px[1] = self.u8();
                    px[0] = self.u8();
                    let a = if easy_bgra { self.u8() } else { 255 };
                    if target == 4 {
                        px[3] = a;
                    }
                } else {
                    let v = if h.bpp == 16 {
                        self.u16() as u32
                    } else {
                        self.u32()
                    };
                    px[0] = channels[0].extract(v);
                    px[1] = channels[1].extract(v);
                    px[2] = channels[2].extract(v);
                    if target == 4 {
                        px[3] = if ma != 0 { channels[3].extract(v) } else { 255 };
                    }
                }
            }
            self.skip(pad);
        }
        Ok(())
    }
}

/// True when the stream starts with `BM` and a known info header size.
pub fn test(reader: &mut ByteReader) -> bool {
    BmpDecoder::new(reader).read_prefix().is_ok()
}

/// Read dimensions; channels are bits per pixel over 8 (at least 1).
pub fn probe(reader: &mut ByteReader) -> Result<ImageInfo> {
    let mut decoder = BmpDecoder::new(reader);
    let (_, size) = decoder.read_prefix()?;
    let (width, height) = if size == 12 {
        (decoder.u16() as u32, (decoder.u16() as i16).unsigned_abs() as u32)
    } else {
        (decoder.u32(), (decoder.u32() as i32).unsigned_abs())
    };
    if decoder.u16() != 1 {
        return Err(Error::corrupt("bad BMP planes"));
    }
    let bpp = decoder.u16() as usize;
    Ok(ImageInfo {
        width,
        height,
        channels: (bpp / 8).max(1),
    })
}

/// Decode a BMP into `req` channels (0 keeps the native count).
///
/// Native images are RGB, or RGBA when the header carries an alpha mask.
pub fn decode(reader: &mut ByteReader, req: usize) -> Result<Decoded> {
    if req > 4 {
        return Err(Error::unsupported(format!("{req} requested channels")));
    }
    let mut decoder = BmpDecoder::new(reader);
    let header = decoder.read_header()?;
    let native = if header.masks[3] != 0 { 4 } else { 3 };
    let target = if req >= 3 { req } else { native };

    let mut out = vec![0u8; image_size(header.width, header.height, target)?];
    if header.bpp < 16 {
        decoder.load_paletted(&header, &mut out, target)?;
    } else {
        decoder.load_direct(&header, &mut out, target)?;
    }

    if header.flip {
        let stride = header.width * target;
        let rows = header.height;
        for j in 0..rows / 2 {
            let (top, bottom) = out.split_at_mut((rows - 1 - j) * stride);
            top[j * stride..(j + 1) * stride].swap_with_slice(&mut bottom[..stride]);
        }
    }

    let final_n = if req == 0 { target } else { req };
    let pixels = crate::color::convert(out, target, final_n, header.width, header.height)?;
    Ok(Decoded {
        pixels,
        width: header.width as u32,
        height: header.height as u32,
        channels: native,
    })
}
