//! GIF decoder (first frame only).
//!
//! Output is always 4 channels. The canvas is the logical screen; the first
//! image block is drawn into it over a transparent background.

use super::reader::ByteReader;
use super::{Decoded, ImageInfo};
use crate::error::{image_size, Error, Result};

const MAX_CODES: usize = 4096;

const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_TRAILER: u8 = 0x3B;
const EXT_GRAPHIC_CONTROL: u8 = 0xF9;

type Palette = [[u8; 4]; 256];

#[derive(Clone, Copy, Default)]
struct LzwEntry {
    /// Previous code in the chain, `None` for root codes.
    prefix: Option<u16>,
    first: u8,
    suffix: u8,
}

/// Writes decoded indices into the canvas, following the interlace schedule.
struct Raster<'o> {
    out: &'o mut [u8],
    colors: &'o Palette,
    line_size: usize,
    start_x: usize,
    start_y: usize,
    max_x: usize,
    max_y: usize,
    cur_x: usize,
    cur_y: usize,
    step: usize,
    parse: u32,
}

impl Raster<'_> {
    fn emit(&mut self, index: u8) {
        // A zero-width descriptor has nothing to draw.
        if self.cur_y >= self.max_y || self.cur_x >= self.max_x {
            return;
        }
        let c = self.colors[index as usize];
        if c[3] >= 128 {
            let p = self.cur_x + self.cur_y;
            self.out[p..p + 4].copy_from_slice(&c);
        }
        self.cur_x += 4;

        if self.cur_x >= self.max_x {
            self.cur_x = self.start_x;
            self.cur_y += self.step;
            // Interlaced passes start at rows 4, 2, 1 with halving strides.
            while self.cur_y >= self.max_y && self.parse > 0 {
                self.step = (1 << self.parse) * self.line_size;
                self.cur_y = self.start_y + (self.step >> 1);
                self.parse -= 1;
            }
        }
    }
}

struct GifDecoder<'r, 'a> {
    reader: &'r mut ByteReader<'a>,
    width: usize,
    height: usize,
    flags: u8,
    bg_index: u8,
    transparent: Option<u8>,
    palette: Palette,
    codes: Vec<LzwEntry>,
    chain: Vec<u8>,
}

impl<'r, 'a> GifDecoder<'r, 'a> {
    fn new(reader: &'r mut ByteReader<'a>) -> Self {
        Self {
            reader,
            width: 0,
            height: 0,
            flags: 0,
            bg_index: 0,
            transparent: None,
            palette: [[0; 4]; 256],
            codes: Vec::new(),
            chain: Vec::new(),
        }
    }

    fn check_signature(&mut self) -> Result<()> {
        let mut magic = [0u8; 6];
        for b in &mut magic {
            *b = self.reader.get_u8();
        }
        match &magic {
            b"GIF87a" | b"GIF89a" => Ok(()),
            _ => Err(Error::corrupt("not GIF")),
        }
    }

    fn read_header(&mut self, info_only: bool) -> Result<()> {
        self.check_signature()?;
        self.width = self.reader.get_u16le() as usize;
        self.height = self.reader.get_u16le() as usize;
        self.flags = self.reader.get_u8();
        self.bg_index = self.reader.get_u8();
        let _aspect = self.reader.get_u8();
        log::debug!(
            "gif screen {}x{} global table={}",
            self.width,
            self.height,
            self.flags & 0x80 != 0
        );
        if info_only {
            return Ok(());
        }
        if self.flags & 0x80 != 0 {
            let mut palette = [[0u8; 4]; 256];
            self.read_color_table(&mut palette, 2 << (self.flags & 7), None);
            self.palette = palette;
        }
        Ok(())
    }

    fn read_color_table(&mut self, palette: &mut Palette, entries: usize, transparent: Option<u8>) {
        for (i, entry) in palette.iter_mut().take(entries).enumerate() {
            entry[0] = self.reader.get_u8();
            entry[1] = self.reader.get_u8();
            entry[2] = self.reader.get_u8();
            entry[3] = if transparent == Some(i as u8) { 0 } else { 255 };
        }
    }

    fn skip_sub_blocks(&mut self) {
        loop {
            let len = self.reader.get_u8();
            if len == 0 {
                break;
            }
            self.reader.skip(len as usize);
        }
    }

    /// Push the symbols of `code`'s prefix chain onto `self.chain`, last
    /// symbol first.
    fn expand(&mut self, code: u16) {
        self.chain.clear();
        let mut next = Some(code);
        while let Some(c) = next {
            let entry = self.codes[c as usize];
            self.chain.push(entry.suffix);
            next = entry.prefix;
        }
    }

    fn process_raster(&mut self, raster: &mut Raster) -> Result<()> {
        let lzw_cs = self.reader.get_u8() as u32;
        if lzw_cs > 11 {
            return Err(Error::corrupt("bad LZW code size"));
        }
        let clear = 1usize << lzw_cs;
        let mut codesize = lzw_cs + 1;
        let mut codemask = (1u32 << codesize) - 1;
        let mut bits = 0u32;
        let mut valid_bits = 0u32;
        let mut seen_clear = false;

        self.codes.clear();
        self.codes.resize(MAX_CODES, LzwEntry::default());
        for (code, entry) in self.codes.iter_mut().enumerate().take(clear) {
            *entry = LzwEntry {
                prefix: None,
                first: code as u8,
                suffix: code as u8,
            };
        }

        let mut avail = clear + 2;
        let mut oldcode: Option<usize> = None;
        let mut len = 0u8;

        loop {
            if valid_bits < codesize {
                if len == 0 {
                    len = self.reader.get_u8();
                    if len == 0 {
                        return Ok(());
                    }
                }
                len -= 1;
                bits |= (self.reader.get_u8() as u32) << valid_bits;
                valid_bits += 8;
                continue;
            }

            let code = (bits & codemask) as usize;
            bits >>= codesize;
            valid_bits -= codesize;

            if code == clear {
                codesize = lzw_cs + 1;
                codemask = (1 << codesize) - 1;
                avail = clear + 2;
                oldcode = None;
                seen_clear = true;
            } else if code == clear + 1 {
                log::trace!("gif end of information code");
                self.reader.skip(len as usize);
                self.skip_sub_blocks();
                return Ok(());
            } else if code <= avail {
                if !seen_clear {
                    return Err(Error::corrupt("no clear code"));
                }
                if let Some(old) = oldcode {
                    if avail >= MAX_CODES {
                        return Err(Error::corrupt("too many codes"));
                    }
                    let first = self.codes[old].first;
                    let suffix = if code == avail {
                        first
                    } else {
                        self.codes[code].first
                    };
                    self.codes[avail] = LzwEntry {
                        prefix: Some(old as u16),
                        first,
                        suffix,
                    };
                    avail += 1;
                } else if code == avail {
                    return Err(Error::corrupt("illegal code in raster"));
                }

                self.expand(code as u16);
                for &index in self.chain.iter().rev() {
                    raster.emit(index);
                }

                if avail & codemask as usize == 0 && avail <= 0x0FFF {
                    codesize += 1;
                    codemask = (1 << codesize) - 1;
                }
                oldcode = Some(code);
            } else {
                return Err(Error::corrupt("illegal code in raster"));
            }
        }
    }

    /// Decode the first image block, or `None` if the stream ends first.
    fn load(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_header(false)?;
        let mut out = vec![0u8; image_size(self.width, self.height, 4)?];
        let mut bg = self.palette[self.bg_index as usize];
        bg[3] = 0;
        for px in out.chunks_exact_mut(4) {
            px.copy_from_slice(&bg);
        }
        let mut use_transparency = false;

        loop {
            let block = self.reader.get_u8();
            match block {
                BLOCK_IMAGE => {
                    let x = self.reader.get_u16le() as usize;
                    let y = self.reader.get_u16le() as usize;
                    let w = self.reader.get_u16le() as usize;
                    let h = self.reader.get_u16le() as usize;
                    if x + w > self.width || y + h > self.height {
                        return Err(Error::corrupt("bad image descriptor"));
                    }
                    if w == 0 || h == 0 {
                        log::debug!("gif empty image descriptor at ({x},{y})");
                    }
                    let lflags = self.reader.get_u8();
                    let interlaced = lflags & 0x40 != 0;
                    log::debug!("gif image {w}x{h} at ({x},{y}) interlaced={interlaced}");

                    let transparent = if use_transparency { self.transparent } else { None };
                    let mut colors = [[0u8; 4]; 256];
                    if lflags & 0x80 != 0 {
                        self.read_color_table(&mut colors, 2 << (lflags & 7), transparent);
                    } else if self.flags & 0x80 != 0 {
                        colors = self.palette;
                        if let Some(t) = transparent {
                            colors[t as usize][3] = 0;
                        }
                    } else {
                        return Err(Error::corrupt("missing color table"));
                    }

                    let line_size = self.width * 4;
                    let start_x = x * 4;
                    let start_y = y * line_size;
                    let mut raster = Raster {
                        out: &mut out,
                        colors: &colors,
                        line_size,
                        start_x,
                        start_y,
                        max_x: start_x + w * 4,
                        max_y: start_y + h * line_size,
                        cur_x: start_x,
                        cur_y: start_y,
                        step: if interlaced { 8 * line_size } else { line_size },
                        parse: if interlaced { 3 } else { 0 },
                    };
                    self.process_raster(&mut raster)?;
                    return Ok(Some(out));
                }

                BLOCK_EXTENSION => {
                    if self.reader.get_u8() == EXT_GRAPHIC_CONTROL {
                        let len = self.reader.get_u8();
                        if len == 4 {
                            let eflags = self.reader.get_u8();
                            let _delay = self.reader.get_u16le();
                            let index = self.reader.get_u8();
                            use_transparency = eflags & 0x01 != 0;
                            self.transparent = Some(index);
                        } else {
                            self.reader.skip(len as usize);
                            continue;
                        }
                    }
                    self.skip_sub_blocks();
                }

                BLOCK_TRAILER => return Ok(None),

                other => {
                    return Err(Error::corrupt(format!("unknown block 0x{other:02X}")));
                }
            }
        }
    }
}

/// True when the stream starts with `GIF87a` or `GIF89a`.
pub fn test(reader: &mut ByteReader) -> bool {
    GifDecoder::new(reader).check_signature().is_ok()
}

/// Read the logical screen size. GIFs always report 4 channels.
pub fn probe(reader: &mut ByteReader) -> Result<ImageInfo> {
    let mut decoder = GifDecoder::new(reader);
    decoder.read_header(true)?;
    Ok(ImageInfo {
        width: decoder.width as u32,
        height: decoder.height as u32,
        channels: 4,
    })
}

/// Decode the first frame into `req` channels (0 keeps RGBA).
///
/// A stream whose trailer arrives before any image block decodes to `None`.
pub fn decode(reader: &mut ByteReader, req: usize) -> Result<Option<Decoded>> {
    if req > 4 {
        return Err(Error::unsupported(format!("{req} requested channels")));
    }
    let mut decoder = GifDecoder::new(reader);
    let Some(rgba) = decoder.load()? else {
        return Ok(None);
    };
    let target = if req == 0 { 4 } else { req };
    let pixels = crate::color::convert(rgba, 4, target, decoder.width, decoder.height)?;
    Ok(Some(Decoded {
        pixels,
        width: decoder.width as u32,
        height: decoder.height as u32,
        channels: 4,
    }))
}
