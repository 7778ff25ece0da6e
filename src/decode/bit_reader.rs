//! LSB-first bit reader for DEFLATE streams.
//!
//! Provides peek/consume semantics for Huffman decoding. Peeking past the
//! end of the data yields zero bits; consuming them is an error.

use crate::error::{Error, Result};

/// Bit reader for LSB-first bit streams (DEFLATE).
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u64,
    bits_in_buf: u32,
    consumed: usize,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bits_in_buf: 0,
            consumed: 0,
        }
    }

    /// Top the buffer up to at least 57 bits, padding with zeros past the end.
    #[inline]
    fn refill(&mut self) {
        while self.bits_in_buf <= 56 {
            let byte = self.data.get(self.pos).copied().unwrap_or(0);
            self.pos += 1;
            self.bit_buf |= (byte as u64) << self.bits_in_buf;
            self.bits_in_buf += 8;
        }
    }

    /// Peek at the next `n` bits (`n <= 32`) without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        if self.bits_in_buf < n {
            self.refill();
        }
        (self.bit_buf & ((1u64 << n) - 1)) as u32
    }

    /// Consume `n` previously peeked bits.
    #[inline]
    pub fn consume(&mut self, n: u32) -> Result<()> {
        debug_assert!(n <= self.bits_in_buf);
        self.bit_buf >>= n;
        self.bits_in_buf -= n;
        self.consumed += n as usize;
        if self.consumed > self.data.len() * 8 {
            return Err(Error::corrupt("unexpected end of stream"));
        }
        Ok(())
    }

    /// Read `n` bits LSB-first.
    #[inline]
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        let val = self.peek_bits(n);
        self.consume(n)?;
        Ok(val)
    }

    /// Discard the remaining bits of the current byte.
    pub fn align_to_byte(&mut self) {
        let discard = self.bits_in_buf % 8;
        self.bit_buf >>= discard;
        self.bits_in_buf -= discard;
        self.consumed += discard as usize;
    }

    /// Whole bytes of real input not yet consumed.
    pub fn remaining_bytes(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.consumed) / 8
    }

    /// Copy bytes into `out`; the reader must be byte-aligned.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        if self.remaining_bytes() < out.len() {
            return Err(Error::corrupt("read past buffer"));
        }

        let mut filled = 0;
        while self.bits_in_buf >= 8 && filled < out.len() {
            out[filled] = self.bit_buf as u8;
            self.bit_buf >>= 8;
            self.bits_in_buf -= 8;
            self.consumed += 8;
            filled += 1;
        }

        let rest = out.len() - filled;
        if rest > 0 {
            out[filled..].copy_from_slice(&self.data[self.pos..self.pos + rest]);
            self.pos += rest;
            self.consumed += rest * 8;
        }
        Ok(())
    }
}
