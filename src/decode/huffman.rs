//! Canonical Huffman decoding tables for JPEG and DEFLATE.
//!
//! Both flavors build a 2^9 entry direct-lookup table for short codes and a
//! max-code-per-length ladder for the slow path. JPEG codes are assigned
//! lowest length first in the order the symbols are listed and read MSB-first;
//! DEFLATE codes are assigned in symbol order and read LSB-first, so the fast
//! table is indexed by bit-reversed codes.

use super::bit_reader::BitReader;
use crate::error::{Error, Result};

/// Bits resolved by a single fast-table lookup.
pub const FAST_BITS: u32 = 9;
const FAST_SIZE: usize = 1 << FAST_BITS;
const FAST_NONE: u16 = u16::MAX;

/// `(1 << n) - 1` for `n` in `0..=16`.
const BIT_MASK: [u32; 17] = [
    0, 1, 3, 7, 15, 31, 63, 127, 255, 511, 1023, 2047, 4095, 8191, 16383, 32767, 65535,
];

/// JPEG Huffman table (DC or AC), MSB-first.
#[derive(Clone)]
pub struct JpegHuffman {
    fast: [u16; FAST_SIZE],
    code: [u16; 256],
    values: [u8; 256],
    size: [u8; 257],
    maxcode: [u32; 18],
    delta: [i32; 17],
}

impl JpegHuffman {
    /// Build from the 16 per-length code counts and the symbol list of a DHT
    /// segment.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptStream`] when more than 256 symbols are declared or a
    /// length holds more codes than fit in that many bits.
    pub fn new(counts: &[u8; 16], symbols: &[u8]) -> Result<Self> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total > 256 || symbols.len() < total {
            return Err(Error::corrupt("bad DHT header"));
        }

        let mut table = Self {
            fast: [FAST_NONE; FAST_SIZE],
            code: [0; 256],
            values: [0; 256],
            size: [0; 257],
            maxcode: [0; 18],
            delta: [0; 17],
        };
        table.values[..total].copy_from_slice(&symbols[..total]);

        let mut k = 0usize;
        for (i, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                table.size[k] = (i + 1) as u8;
                k += 1;
            }
        }
        table.size[k] = 0;

        let mut code = 0u32;
        k = 0;
        for j in 1..=16u32 {
            table.delta[j as usize] = k as i32 - code as i32;
            if table.size[k] as u32 == j {
                while table.size[k] as u32 == j {
                    table.code[k] = code as u16;
                    code += 1;
                    k += 1;
                }
                if code - 1 >= 1 << j {
                    return Err(Error::corrupt("bad code lengths"));
                }
            }
            table.maxcode[j as usize] = code << (16 - j);
            code <<= 1;
        }
        table.maxcode[17] = u32::MAX;

        for i in 0..k {
            let s = table.size[i] as u32;
            if s <= FAST_BITS {
                let c = (table.code[i] as usize) << (FAST_BITS - s);
                let m = 1usize << (FAST_BITS - s);
                for slot in &mut table.fast[c..c + m] {
                    *slot = i as u16;
                }
            }
        }
        Ok(table)
    }

    /// Resolve the code at the top of a left-aligned bit buffer.
    ///
    /// `bits` is the number of valid bits in `buffer`. Returns the symbol and
    /// its code length, or `None` for an invalid or incomplete code.
    #[inline]
    pub fn lookup(&self, buffer: u32, bits: u32) -> Option<(u8, u32)> {
        let c = (buffer >> (32 - FAST_BITS)) as usize & (FAST_SIZE - 1);
        let k = self.fast[c];
        if k != FAST_NONE {
            let s = self.size[k as usize] as u32;
            if s > bits {
                return None;
            }
            return Some((self.values[k as usize], s));
        }

        let temp = buffer >> 16;
        let mut k = FAST_BITS as usize + 1;
        while temp >= self.maxcode[k] {
            k += 1;
        }
        if k == 17 || k as u32 > bits {
            return None;
        }
        let c = ((buffer >> (32 - k)) & BIT_MASK[k]) as i32 + self.delta[k];
        if !(0..256).contains(&c) {
            return None;
        }
        Some((self.values[c as usize], k as u32))
    }
}

/// DEFLATE Huffman table, LSB-first.
pub struct DeflateHuffman {
    /// Packed `(length << 9) | symbol`, zero when the code is longer than
    /// [`FAST_BITS`] or unused.
    fast: [u16; FAST_SIZE],
    firstcode: [u16; 16],
    maxcode: [u32; 17],
    firstsymbol: [u16; 16],
    size: [u8; 288],
    value: [u16; 288],
}

/// Reverse the low `bits` bits of `v`.
#[inline]
fn bit_reverse(v: u32, bits: u32) -> u32 {
    debug_assert!((1..=16).contains(&bits));
    (v as u16).reverse_bits() as u32 >> (16 - bits)
}

impl DeflateHuffman {
    /// Build from a code length per symbol (0 = unused).
    ///
    /// # Errors
    ///
    /// [`Error::CorruptStream`] when the lengths oversubscribe the code space.
    pub fn new(lengths: &[u8]) -> Result<Self> {
        if lengths.len() > 288 {
            return Err(Error::corrupt("bad sizes"));
        }
        let mut sizes = [0u32; 17];
        for &len in lengths {
            if len > 15 {
                return Err(Error::corrupt("bad sizes"));
            }
            sizes[len as usize] += 1;
        }
        sizes[0] = 0;
        for (i, &count) in sizes.iter().enumerate().take(16).skip(1) {
            if count > 1 << i {
                return Err(Error::corrupt("bad sizes"));
            }
        }

        let mut table = Self {
            fast: [0; FAST_SIZE],
            firstcode: [0; 16],
            maxcode: [0; 17],
            firstsymbol: [0; 16],
            size: [0; 288],
            value: [0; 288],
        };

        let mut next_code = [0u32; 16];
        let mut code = 0u32;
        let mut k = 0u32;
        for i in 1..16usize {
            next_code[i] = code;
            table.firstcode[i] = code as u16;
            table.firstsymbol[i] = k as u16;
            code += sizes[i];
            if sizes[i] != 0 && code - 1 >= 1 << i {
                return Err(Error::corrupt("bad codelengths"));
            }
            table.maxcode[i] = code << (16 - i);
            code <<= 1;
            k += sizes[i];
        }
        table.maxcode[16] = 0x10000;

        for (symbol, &len) in lengths.iter().enumerate() {
            let s = len as usize;
            if s == 0 {
                continue;
            }
            let c = (next_code[s] - table.firstcode[s] as u32 + table.firstsymbol[s] as u32)
                as usize;
            table.size[c] = len;
            table.value[c] = symbol as u16;
            if s as u32 <= FAST_BITS {
                let packed = ((s as u16) << 9) | symbol as u16;
                let mut j = bit_reverse(next_code[s], s as u32) as usize;
                while j < FAST_SIZE {
                    table.fast[j] = packed;
                    j += 1 << s;
                }
            }
            next_code[s] += 1;
        }
        Ok(table)
    }

    /// Decode one symbol.
    #[inline]
    pub fn decode(&self, reader: &mut BitReader) -> Result<u16> {
        let peek = reader.peek_bits(16);
        let entry = self.fast[peek as usize & (FAST_SIZE - 1)];
        if entry != 0 {
            reader.consume((entry >> 9) as u32)?;
            return Ok(entry & 511);
        }
        self.decode_slow(reader, peek)
    }

    fn decode_slow(&self, reader: &mut BitReader, peek: u32) -> Result<u16> {
        let k = bit_reverse(peek, 16);
        let mut s = FAST_BITS as usize + 1;
        while k >= self.maxcode[s] {
            s += 1;
        }
        if s >= 16 {
            return Err(Error::corrupt("bad huffman code"));
        }
        let b = (k >> (16 - s)) as i64 - self.firstcode[s] as i64 + self.firstsymbol[s] as i64;
        if !(0..288).contains(&b) || self.size[b as usize] as usize != s {
            return Err(Error::corrupt("bad huffman code"));
        }
        reader.consume(s as u32)?;
        Ok(self.value[b as usize])
    }
}
