//! DEFLATE decompression (RFC 1951) with optional zlib wrapper (RFC 1950).
//!
//! Used by the PNG decoder for IDAT data. Blocks are decoded with the
//! canonical tables from [`super::huffman`]; the fixed-code tables are built
//! once per process and shared.

use std::sync::OnceLock;

use super::bit_reader::BitReader;
use super::huffman::DeflateHuffman;
use crate::error::{Error, Result};

/// Length code base values (codes 257-285).
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for length codes.
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance code base values (codes 0-29).
const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes.
const DISTANCE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Transmission order of the code-length alphabet.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Partial decoding stops at the first block boundary past this many bytes.
const PARTIAL_LIMIT: usize = 65536;

/// Initial output capacity when the caller has no better estimate.
pub const DEFAULT_SIZE_HINT: usize = 16384;

struct FixedTables {
    literal: DeflateHuffman,
    distance: DeflateHuffman,
}

fn fixed_tables() -> Result<&'static FixedTables> {
    static FIXED: OnceLock<Result<FixedTables>> = OnceLock::new();
    FIXED
        .get_or_init(|| {
            let mut lengths = [0u8; 288];
            lengths[..144].fill(8);
            lengths[144..256].fill(9);
            lengths[256..280].fill(7);
            lengths[280..].fill(8);
            Ok(FixedTables {
                literal: DeflateHuffman::new(&lengths)?,
                distance: DeflateHuffman::new(&[5u8; 32])?,
            })
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Running Adler-32 checksum of the inflated output.
struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    const MODULUS: u32 = 65_521;
    /// Largest run that cannot overflow `b` before reduction.
    const BLOCK: usize = 5552;

    fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    fn update(&mut self, data: &[u8]) {
        for run in data.chunks(Self::BLOCK) {
            for &byte in run {
                self.a += byte as u32;
                self.b += self.a;
            }
            self.a %= Self::MODULUS;
            self.b %= Self::MODULUS;
        }
    }

    fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

/// Checksum of `data` as stored in a zlib trailer.
pub fn adler32(data: &[u8]) -> u32 {
    let mut sum = Adler32::new();
    sum.update(data);
    sum.finish()
}

struct Inflater<'a> {
    reader: BitReader<'a>,
    out: Vec<u8>,
    partial: bool,
}

impl<'a> Inflater<'a> {
    fn new(data: &'a [u8], size_hint: usize, partial: bool) -> Result<Self> {
        let mut out = Vec::new();
        out.try_reserve_exact(size_hint.max(1))
            .map_err(|_| Error::ResourceExhausted("inflate output buffer".into()))?;
        Ok(Self {
            reader: BitReader::new(data),
            out,
            partial,
        })
    }

    /// Make room for `n` more bytes, doubling capacity as needed.
    fn grow(&mut self, n: usize) -> Result<()> {
        let needed = self
            .out
            .len()
            .checked_add(n)
            .ok_or_else(|| Error::ResourceExhausted("inflate output too large".into()))?;
        let mut cap = self.out.capacity().max(1);
        if needed <= cap {
            return Ok(());
        }
        while cap < needed {
            cap = cap
                .checked_mul(2)
                .ok_or_else(|| Error::ResourceExhausted("inflate output too large".into()))?;
        }
        self.out
            .try_reserve_exact(cap - self.out.len())
            .map_err(|_| Error::ResourceExhausted("inflate output buffer".into()))
    }

    fn parse_zlib_header(&mut self) -> Result<()> {
        if self.reader.remaining_bytes() < 2 {
            return Err(Error::corrupt("bad zlib header"));
        }
        let cmf = self.reader.read_bits(8)?;
        let flg = self.reader.read_bits(8)?;
        if (cmf * 256 + flg) % 31 != 0 {
            return Err(Error::corrupt("bad zlib header"));
        }
        if flg & 32 != 0 {
            return Err(Error::unsupported("preset dictionary not allowed in png"));
        }
        if cmf & 15 != 8 {
            return Err(Error::corrupt("bad compression method"));
        }
        Ok(())
    }

    /// Decode blocks until the final one; returns whether decoding stopped
    /// early because of partial mode.
    fn run(&mut self) -> Result<bool> {
        loop {
            let last = self.reader.read_bits(1)?;
            let kind = self.reader.read_bits(2)?;
            log::trace!("deflate block type {kind}, final {last}");
            match kind {
                0 => self.stored_block()?,
                1 => {
                    let fixed = fixed_tables()?;
                    self.huffman_block(&fixed.literal, &fixed.distance)?;
                }
                2 => {
                    let (literal, distance) = self.dynamic_tables()?;
                    self.huffman_block(&literal, &distance)?;
                }
                _ => return Err(Error::corrupt("reserved deflate block type")),
            }
            if last == 1 {
                return Ok(false);
            }
            if self.partial && self.out.len() > PARTIAL_LIMIT {
                return Ok(true);
            }
        }
    }

    fn stored_block(&mut self) -> Result<()> {
        self.reader.align_to_byte();
        let len = self.reader.read_bits(16)?;
        let nlen = self.reader.read_bits(16)?;
        if nlen != (len ^ 0xFFFF) {
            return Err(Error::corrupt("stored block length check failed"));
        }
        let len = len as usize;
        if self.reader.remaining_bytes() < len {
            return Err(Error::corrupt("read past buffer"));
        }
        self.grow(len)?;
        let start = self.out.len();
        self.out.resize(start + len, 0);
        self.reader.read_bytes(&mut self.out[start..])
    }

    fn dynamic_tables(&mut self) -> Result<(DeflateHuffman, DeflateHuffman)> {
        let hlit = self.reader.read_bits(5)? as usize + 257;
        let hdist = self.reader.read_bits(5)? as usize + 1;
        let hclen = self.reader.read_bits(4)? as usize + 4;
        let total = hlit + hdist;

        let mut cl_lengths = [0u8; 19];
        for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
            cl_lengths[slot] = self.reader.read_bits(3)? as u8;
        }
        let cl_table = DeflateHuffman::new(&cl_lengths)?;

        let mut lengths = [0u8; 288 + 32];
        let mut n = 0;
        while n < total {
            let c = cl_table.decode(&mut self.reader)?;
            if c < 16 {
                lengths[n] = c as u8;
                n += 1;
                continue;
            }
            let (repeat, fill) = match c {
                16 => {
                    if n == 0 {
                        return Err(Error::corrupt("bad codelengths"));
                    }
                    (self.reader.read_bits(2)? as usize + 3, lengths[n - 1])
                }
                17 => (self.reader.read_bits(3)? as usize + 3, 0),
                18 => (self.reader.read_bits(7)? as usize + 11, 0),
                _ => return Err(Error::corrupt("bad codelengths")),
            };
            if total - n < repeat {
                return Err(Error::corrupt("bad codelengths"));
            }
            lengths[n..n + repeat].fill(fill);
            n += repeat;
        }

        let literal = DeflateHuffman::new(&lengths[..hlit])?;
        let distance = DeflateHuffman::new(&lengths[hlit..total])?;
        Ok((literal, distance))
    }

    fn huffman_block(&mut self, literal: &DeflateHuffman, distance: &DeflateHuffman) -> Result<()> {
        loop {
            let symbol = literal.decode(&mut self.reader)? as usize;
            if symbol < 256 {
                if self.out.len() == self.out.capacity() {
                    self.grow(1)?;
                }
                self.out.push(symbol as u8);
                continue;
            }
            if symbol == 256 {
                return Ok(());
            }

            let index = symbol - 257;
            if index >= LENGTH_BASE.len() {
                return Err(Error::corrupt("bad huffman code"));
            }
            let length = LENGTH_BASE[index] as usize
                + self.reader.read_bits(LENGTH_EXTRA[index] as u32)? as usize;

            let dist_symbol = distance.decode(&mut self.reader)? as usize;
            if dist_symbol >= DISTANCE_BASE.len() {
                return Err(Error::corrupt("bad huffman code"));
            }
            let dist = DISTANCE_BASE[dist_symbol] as usize
                + self.reader.read_bits(DISTANCE_EXTRA[dist_symbol] as u32)? as usize;
            if dist > self.out.len() {
                return Err(Error::corrupt("bad dist"));
            }

            self.grow(length)?;
            let start = self.out.len() - dist;
            if dist == 1 {
                let byte = self.out[start];
                self.out.resize(self.out.len() + length, byte);
            } else {
                // Source and destination may overlap, so copy byte by byte.
                for i in 0..length {
                    let byte = self.out[start + i];
                    self.out.push(byte);
                }
            }
        }
    }

    /// Compare the Adler-32 trailer when one is present.
    fn check_trailer(&mut self) -> Result<()> {
        self.reader.align_to_byte();
        if self.reader.remaining_bytes() < 4 {
            log::trace!("zlib stream has no adler32 trailer");
            return Ok(());
        }
        let mut trailer = [0u8; 4];
        self.reader.read_bytes(&mut trailer)?;
        let stored = u32::from_be_bytes(trailer);
        let computed = adler32(&self.out);
        if stored != computed {
            return Err(Error::corrupt(format!(
                "adler32 mismatch: expected {stored:08X}, got {computed:08X}"
            )));
        }
        Ok(())
    }
}

/// Inflate a zlib-wrapped stream.
///
/// `size_hint` sets the initial output capacity; the buffer doubles from
/// there. With `partial`, decoding may stop at a block boundary once more
/// than 64 KiB has been produced, and the checksum is then not verified.
///
/// # Errors
///
/// [`Error::CorruptStream`] for a bad header, invalid codes, out-of-range
/// back-references, truncated input, or a checksum mismatch.
pub fn inflate_zlib(data: &[u8], size_hint: usize, partial: bool) -> Result<Vec<u8>> {
    let mut inflater = Inflater::new(data, size_hint, partial)?;
    inflater.parse_zlib_header()?;
    let stopped_early = inflater.run()?;
    if !stopped_early {
        inflater.check_trailer()?;
    }
    Ok(inflater.out)
}

/// Inflate a raw DEFLATE stream with no zlib header or trailer.
pub fn inflate_raw(data: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut inflater = Inflater::new(data, size_hint, false)?;
    inflater.run()?;
    Ok(inflater.out)
}
