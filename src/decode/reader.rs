//! Forward-only byte cursor shared by all decoders.
//!
//! A [`ByteReader`] reads either a memory-resident slice or a pull source
//! ([`std::io::Read`]) through a small refill buffer. Reads past the end
//! yield a zero byte instead of failing, so header parsers can read fixed
//! layouts and validate afterwards; callers that care check [`ByteReader::at_end`].

use std::io::Read;

use crate::error::{Error, Result};

/// Size of the refill buffer used for pull sources.
const REFILL_SIZE: usize = 128;

/// Byte cursor over a slice or a pull source.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    stream: Option<&'a mut dyn Read>,
    buf: [u8; REFILL_SIZE],
    buf_pos: usize,
    buf_len: usize,
    eof: bool,
    /// Bytes pulled from the stream while retaining, replayed after rewind.
    retained: Vec<u8>,
    replay_pos: usize,
    retaining: bool,
}

impl<'a> ByteReader<'a> {
    /// Cursor over a memory buffer.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            stream: None,
            buf: [0; REFILL_SIZE],
            buf_pos: 0,
            buf_len: 0,
            eof: false,
            retained: Vec::new(),
            replay_pos: 0,
            retaining: false,
        }
    }

    /// Cursor over a pull source.
    pub fn from_reader(stream: &'a mut dyn Read) -> Self {
        let mut reader = Self::from_slice(&[]);
        reader.stream = Some(stream);
        reader
    }

    fn is_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Keep every byte pulled from a stream so [`rewind`](Self::rewind) can
    /// replay it. Memory sources ignore this.
    pub fn retain(&mut self, on: bool) {
        self.retaining = on;
        if !on && self.replay_pos >= self.retained.len() {
            self.retained.clear();
            self.replay_pos = 0;
        }
    }

    /// Return to the first byte of the source.
    ///
    /// Stream sources can only rewind over bytes read while retaining.
    pub fn rewind(&mut self) {
        if self.is_stream() {
            self.replay_pos = 0;
            self.buf_pos = 0;
            self.buf_len = 0;
            self.eof = false;
        } else {
            self.pos = 0;
        }
    }

    fn refill(&mut self) {
        if self.replay_pos < self.retained.len() {
            let n = (self.retained.len() - self.replay_pos).min(REFILL_SIZE);
            self.buf[..n].copy_from_slice(&self.retained[self.replay_pos..self.replay_pos + n]);
            self.replay_pos += n;
            self.buf_pos = 0;
            self.buf_len = n;
            if !self.retaining && self.replay_pos >= self.retained.len() {
                self.retained.clear();
                self.replay_pos = 0;
            }
            return;
        }

        let n = match self.stream.as_mut() {
            Some(stream) => loop {
                match stream.read(&mut self.buf) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::trace!("read error treated as end of stream: {e}");
                        break 0;
                    }
                }
            },
            None => 0,
        };

        self.buf_pos = 0;
        if n == 0 {
            // Synthesize a single zero so reads past the end stay defined.
            self.buf[0] = 0;
            self.buf_len = 1;
            self.eof = true;
        } else {
            self.buf_len = n;
            if self.retaining {
                self.retained.extend_from_slice(&self.buf[..n]);
                self.replay_pos = self.retained.len();
            }
        }
    }

    /// Read one byte; past the end this returns 0.
    #[inline]
    pub fn get_u8(&mut self) -> u8 {
        if !self.is_stream() {
            let byte = self.data.get(self.pos).copied().unwrap_or(0);
            if self.pos < self.data.len() {
                self.pos += 1;
            }
            return byte;
        }
        if self.buf_pos >= self.buf_len {
            if self.eof {
                return 0;
            }
            self.refill();
        }
        let byte = self.buf[self.buf_pos];
        self.buf_pos += 1;
        byte
    }

    /// Big-endian 16-bit value.
    #[inline]
    pub fn get_u16be(&mut self) -> u16 {
        let hi = self.get_u8() as u16;
        (hi << 8) | self.get_u8() as u16
    }

    /// Big-endian 32-bit value.
    #[inline]
    pub fn get_u32be(&mut self) -> u32 {
        let hi = self.get_u16be() as u32;
        (hi << 16) | self.get_u16be() as u32
    }

    /// Little-endian 16-bit value.
    #[inline]
    pub fn get_u16le(&mut self) -> u16 {
        let lo = self.get_u8() as u16;
        lo | ((self.get_u8() as u16) << 8)
    }

    /// Little-endian 32-bit value.
    #[inline]
    pub fn get_u32le(&mut self) -> u32 {
        let lo = self.get_u16le() as u32;
        lo | ((self.get_u16le() as u32) << 16)
    }

    /// Fill `out` completely.
    ///
    /// # Errors
    ///
    /// A short read is [`Error::CorruptStream`]; the cursor still advances
    /// over whatever bytes were available.
    pub fn get_n(&mut self, out: &mut [u8]) -> Result<()> {
        if !self.is_stream() {
            let available = self.data.len() - self.pos;
            if out.len() > available {
                self.pos = self.data.len();
                return Err(Error::corrupt("unexpected end of data"));
            }
            out.copy_from_slice(&self.data[self.pos..self.pos + out.len()]);
            self.pos += out.len();
            return Ok(());
        }

        let mut filled = 0;
        while filled < out.len() {
            if self.buf_pos >= self.buf_len {
                if self.eof {
                    return Err(Error::corrupt("unexpected end of data"));
                }
                self.refill();
                if self.eof {
                    return Err(Error::corrupt("unexpected end of data"));
                }
            }
            let n = (self.buf_len - self.buf_pos).min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + n]);
            self.buf_pos += n;
            filled += n;
        }
        Ok(())
    }

    /// Read `n` bytes into a new vector.
    pub fn get_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        self.get_n(&mut out)?;
        Ok(out)
    }

    /// Advance `n` bytes, stopping at the end of the source.
    pub fn skip(&mut self, n: usize) {
        if !self.is_stream() {
            self.pos = self.pos.saturating_add(n).min(self.data.len());
            return;
        }
        let mut left = n;
        while left > 0 {
            if self.buf_pos >= self.buf_len {
                if self.eof {
                    return;
                }
                self.refill();
                if self.eof {
                    return;
                }
            }
            let step = (self.buf_len - self.buf_pos).min(left);
            self.buf_pos += step;
            left -= step;
        }
    }

    /// True once every real byte of the source has been consumed.
    pub fn at_end(&mut self) -> bool {
        if !self.is_stream() {
            return self.pos >= self.data.len();
        }
        if self.eof {
            return true;
        }
        if self.buf_pos < self.buf_len {
            return false;
        }
        self.refill();
        if self.eof {
            return true;
        }
        false
    }
}
