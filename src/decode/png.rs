//! PNG decoder for 8-bit images.
//!
//! Handles every color type at bit depth 8, Adam7 interlacing, palettes with
//! optional per-entry alpha, and single-color transparency keys. Chunk CRCs
//! are skipped, not verified.

use super::inflate::{inflate_zlib, DEFAULT_SIZE_HINT};
use super::reader::ByteReader;
use super::{Decoded, ImageInfo};
use crate::error::{checked_size, Error, Result};

/// PNG file signature (magic bytes).
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Maximum width or height accepted from IHDR.
const MAX_DIMENSION: u32 = 1 << 24;

/// IDAT payloads are copied in pieces of at most this many bytes, so the
/// buffer only grows as far as the data actually present.
const IDAT_READ_STEP: usize = 64 * 1024;

const fn chunk_type(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

const IHDR: u32 = chunk_type(b"IHDR");
const PLTE: u32 = chunk_type(b"PLTE");
const TRNS: u32 = chunk_type(b"tRNS");
const IDAT: u32 = chunk_type(b"IDAT");
const IEND: u32 = chunk_type(b"IEND");

/// Adam7 pass origins and spacings.
const ADAM7_X_ORIGIN: [usize; 7] = [0, 4, 0, 2, 0, 1, 0];
const ADAM7_Y_ORIGIN: [usize; 7] = [0, 0, 4, 0, 2, 0, 1];
const ADAM7_X_SPACING: [usize; 7] = [8, 8, 4, 4, 2, 2, 1];
const ADAM7_Y_SPACING: [usize; 7] = [8, 8, 8, 4, 4, 2, 2];

/// Scanline filter after first-row substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    None,
    Sub,
    Up,
    Avg,
    Paeth,
    /// Average with no row above: only the left neighbor contributes.
    AvgFirst,
    /// Paeth with no row above: always predicts the left neighbor.
    PaethFirst,
}

impl Filter {
    fn from_byte(byte: u8, first_row: bool) -> Result<Self> {
        let filter = match byte {
            0 => Filter::None,
            1 => Filter::Sub,
            2 => Filter::Up,
            3 => Filter::Avg,
            4 => Filter::Paeth,
            _ => return Err(Error::corrupt(format!("invalid filter type {byte}"))),
        };
        if !first_row {
            return Ok(filter);
        }
        Ok(match filter {
            Filter::Up => Filter::None,
            Filter::Avg => Filter::AvgFirst,
            Filter::Paeth => Filter::PaethFirst,
            other => other,
        })
    }
}

/// Paeth predictor; ties favor `a`, then `b`.
#[inline]
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Undo one scanline's filter.
///
/// `raw` holds `img_n` bytes per pixel; `cur` and `prior` hold `out_n`. When
/// `out_n == img_n + 1` each output pixel gets an opaque alpha byte.
fn unfilter_row(
    filter: Filter,
    raw: &[u8],
    cur: &mut [u8],
    prior: &[u8],
    img_n: usize,
    out_n: usize,
) {
    let width = raw.len() / img_n;
    for i in 0..width {
        let o = i * out_n;
        for k in 0..img_n {
            let x = raw[i * img_n + k];
            let a = if i > 0 { cur[o - out_n + k] } else { 0 };
            let value = match filter {
                Filter::None => x,
                Filter::Sub => x.wrapping_add(a),
                Filter::Up => x.wrapping_add(prior[o + k]),
                Filter::Avg => x.wrapping_add(((prior[o + k] as u32 + a as u32) >> 1) as u8),
                Filter::Paeth => {
                    let c = if i > 0 { prior[o - out_n + k] } else { 0 };
                    x.wrapping_add(paeth(a, prior[o + k], c))
                }
                Filter::AvgFirst => x.wrapping_add(a >> 1),
                Filter::PaethFirst => x.wrapping_add(paeth(a, 0, 0)),
            };
            cur[o + k] = value;
        }
        if out_n != img_n {
            cur[o + img_n] = 255;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Type,
    Header,
    Load,
}

struct PngDecoder<'r, 'a> {
    reader: &'r mut ByteReader<'a>,
    partial: bool,
    img_x: usize,
    img_y: usize,
    img_n: usize,
    img_out_n: usize,
    out: Vec<u8>,
}

impl<'r, 'a> PngDecoder<'r, 'a> {
    fn new(reader: &'r mut ByteReader<'a>, partial: bool) -> Self {
        Self {
            reader,
            partial,
            img_x: 0,
            img_y: 0,
            img_n: 0,
            img_out_n: 0,
            out: Vec::new(),
        }
    }

    fn check_signature(&mut self) -> Result<()> {
        for &expected in &PNG_SIGNATURE {
            if self.reader.get_u8() != expected {
                return Err(Error::corrupt("bad png sig"));
            }
        }
        Ok(())
    }

    /// Append `length` bytes of IDAT payload to `data`.
    fn read_idat(&mut self, data: &mut Vec<u8>, length: usize) -> Result<()> {
        let mut remaining = length;
        while remaining > 0 {
            let step = remaining.min(IDAT_READ_STEP);
            let start = data.len();
            data.try_reserve(step)
                .map_err(|_| Error::ResourceExhausted("IDAT buffer".into()))?;
            data.resize(start + step, 0);
            self.reader
                .get_n(&mut data[start..])
                .map_err(|_| Error::corrupt("outofdata"))?;
            remaining -= step;
        }
        Ok(())
    }

    /// Defilter a `x` by `y` sub-image from `raw` into a fresh buffer.
    fn create_image_raw(
        &self,
        raw: &[u8],
        out_n: usize,
        x: usize,
        y: usize,
        partial: bool,
    ) -> Result<Vec<u8>> {
        let img_n = self.img_n;
        let stride = checked_size(x, out_n, 1)?;
        let row_len = img_n * x + 1;
        let mut out = vec![0u8; checked_size(stride, y, 1)?];

        let needed = checked_size(row_len, y, 1)?;
        if !partial {
            let full_size = x == self.img_x && y == self.img_y;
            if (full_size && raw.len() != needed) || (!full_size && raw.len() < needed) {
                return Err(Error::corrupt("not enough pixels"));
            }
        }

        let zero_row = vec![0u8; stride];
        for (j, row) in raw.chunks_exact(row_len).take(y).enumerate() {
            let filter = Filter::from_byte(row[0], j == 0)?;
            let (done, rest) = out.split_at_mut(stride * j);
            let prior = if j == 0 {
                &zero_row[..]
            } else {
                &done[stride * (j - 1)..]
            };
            unfilter_row(filter, &row[1..], &mut rest[..stride], prior, img_n, out_n);
        }
        Ok(out)
    }

    fn create_image(&mut self, raw: &[u8], out_n: usize, interlaced: bool) -> Result<()> {
        if !interlaced {
            self.out = self.create_image_raw(raw, out_n, self.img_x, self.img_y, self.partial)?;
            return Ok(());
        }

        let mut canvas = vec![0u8; checked_size(self.img_x, self.img_y, out_n)?];
        let mut offset = 0;
        for p in 0..7 {
            let x = (self.img_x + ADAM7_X_SPACING[p] - ADAM7_X_ORIGIN[p] - 1) / ADAM7_X_SPACING[p];
            let y = (self.img_y + ADAM7_Y_SPACING[p] - ADAM7_Y_ORIGIN[p] - 1) / ADAM7_Y_SPACING[p];
            if x == 0 || y == 0 {
                continue;
            }
            log::trace!("adam7 pass {p}: {x}x{y}");
            let pass = self.create_image_raw(&raw[offset.min(raw.len())..], out_n, x, y, false)?;
            for j in 0..y {
                let dy = j * ADAM7_Y_SPACING[p] + ADAM7_Y_ORIGIN[p];
                for i in 0..x {
                    let dx = i * ADAM7_X_SPACING[p] + ADAM7_X_ORIGIN[p];
                    let dst = (dy * self.img_x + dx) * out_n;
                    let src = (j * x + i) * out_n;
                    canvas[dst..dst + out_n].copy_from_slice(&pass[src..src + out_n]);
                }
            }
            offset += (x * self.img_n + 1) * y;
        }
        self.out = canvas;
        Ok(())
    }

    fn compute_transparency(&mut self, tc: [u8; 3], out_n: usize) {
        if out_n == 2 {
            for px in self.out.chunks_exact_mut(2) {
                px[1] = if px[0] == tc[0] { 0 } else { 255 };
            }
        } else {
            for px in self.out.chunks_exact_mut(4) {
                if px[..3] == tc {
                    px[3] = 0;
                }
            }
        }
    }

    fn expand_palette(&mut self, palette: &[u8; 1024], out_n: usize) -> Result<()> {
        let mut expanded = vec![0u8; checked_size(self.img_x, self.img_y, out_n)?];
        for (dst, &index) in expanded.chunks_exact_mut(out_n).zip(&self.out) {
            let n = index as usize * 4;
            dst.copy_from_slice(&palette[n..n + out_n]);
        }
        self.out = expanded;
        Ok(())
    }

    fn parse_file(&mut self, scan: Scan, req: usize) -> Result<()> {
        self.check_signature()?;
        if scan == Scan::Type {
            return Ok(());
        }

        let mut palette = [0u8; 1024];
        let mut pal_img_n = 0usize;
        let mut pal_len = 0usize;
        let mut has_trans = false;
        let mut tc = [0u8; 3];
        let mut idata: Option<Vec<u8>> = None;
        let mut first = true;
        let mut interlaced = false;

        loop {
            let length = self.reader.get_u32be() as usize;
            let kind = self.reader.get_u32be();
            log::trace!(
                "png chunk {:?} ({length} bytes)",
                String::from_utf8_lossy(&kind.to_be_bytes())
            );

            if first && kind != IHDR {
                return Err(Error::corrupt("first not IHDR"));
            }

            match kind {
                IHDR => {
                    if !first {
                        return Err(Error::corrupt("multiple IHDR"));
                    }
                    first = false;
                    if length != 13 {
                        return Err(Error::corrupt("bad IHDR len"));
                    }
                    let width = self.reader.get_u32be();
                    let height = self.reader.get_u32be();
                    if width > MAX_DIMENSION || height > MAX_DIMENSION {
                        return Err(Error::ResourceExhausted("very large image".into()));
                    }
                    self.img_x = width as usize;
                    self.img_y = height as usize;
                    let depth = self.reader.get_u8();
                    if depth != 8 {
                        return Err(Error::unsupported(format!("{depth}-bit png")));
                    }
                    let color = self.reader.get_u8();
                    if color > 6 {
                        return Err(Error::corrupt("bad ctype"));
                    }
                    if color == 3 {
                        pal_img_n = 3;
                    } else if color & 1 != 0 {
                        return Err(Error::corrupt("bad ctype"));
                    }
                    if self.reader.get_u8() != 0 {
                        return Err(Error::corrupt("bad comp method"));
                    }
                    if self.reader.get_u8() != 0 {
                        return Err(Error::corrupt("bad filter method"));
                    }
                    let interlace = self.reader.get_u8();
                    if interlace > 1 {
                        return Err(Error::corrupt("bad interlace method"));
                    }
                    interlaced = interlace == 1;
                    if self.img_x == 0 || self.img_y == 0 {
                        return Err(Error::InvalidDimensions { width, height });
                    }
                    log::debug!(
                        "png {width}x{height} color type {color} interlaced={interlaced}"
                    );
                    if pal_img_n == 0 {
                        self.img_n = (if color & 2 != 0 { 3 } else { 1 })
                            + usize::from(color & 4 != 0);
                        if (1 << 30) / self.img_x / self.img_n < self.img_y {
                            return Err(Error::ResourceExhausted("image too large".into()));
                        }
                        if scan == Scan::Header {
                            return Ok(());
                        }
                    } else {
                        // Palette indices are filtered as one channel; keep
                        // scanning in header mode to find a tRNS.
                        self.img_n = 1;
                        if (1 << 30) / self.img_x / 4 < self.img_y {
                            return Err(Error::ResourceExhausted("image too large".into()));
                        }
                    }
                }

                PLTE => {
                    if length > 256 * 3 || length % 3 != 0 {
                        return Err(Error::corrupt("invalid PLTE"));
                    }
                    pal_len = length / 3;
                    for entry in palette.chunks_exact_mut(4).take(pal_len) {
                        entry[0] = self.reader.get_u8();
                        entry[1] = self.reader.get_u8();
                        entry[2] = self.reader.get_u8();
                        entry[3] = 255;
                    }
                }

                TRNS => {
                    if idata.is_some() {
                        return Err(Error::corrupt("tRNS after IDAT"));
                    }
                    if pal_img_n != 0 {
                        if scan == Scan::Header {
                            self.img_n = 4;
                            return Ok(());
                        }
                        if pal_len == 0 {
                            return Err(Error::corrupt("tRNS before PLTE"));
                        }
                        if length > pal_len {
                            return Err(Error::corrupt("bad tRNS len"));
                        }
                        pal_img_n = 4;
                        for entry in palette.chunks_exact_mut(4).take(length) {
                            entry[3] = self.reader.get_u8();
                        }
                    } else {
                        if self.img_n & 1 == 0 {
                            return Err(Error::corrupt("tRNS with alpha"));
                        }
                        if length != self.img_n * 2 {
                            return Err(Error::corrupt("bad tRNS len"));
                        }
                        has_trans = true;
                        for key in tc.iter_mut().take(self.img_n) {
                            // 16-bit sample; the low byte is the 8-bit key.
                            *key = self.reader.get_u16be() as u8;
                        }
                    }
                }

                IDAT => {
                    if pal_img_n != 0 && pal_len == 0 {
                        return Err(Error::corrupt("no PLTE"));
                    }
                    if scan == Scan::Header {
                        self.img_n = pal_img_n;
                        return Ok(());
                    }
                    let data = idata.get_or_insert_with(Vec::new);
                    self.read_idat(data, length)?;
                }

                IEND => {
                    if scan != Scan::Load {
                        return Ok(());
                    }
                    let data = idata.take().ok_or_else(|| Error::corrupt("no IDAT"))?;
                    let raw = inflate_zlib(&data, DEFAULT_SIZE_HINT, self.partial)?;
                    drop(data);

                    self.img_out_n = if (req == self.img_n + 1 && req != 3 && pal_img_n == 0)
                        || has_trans
                    {
                        self.img_n + 1
                    } else {
                        self.img_n
                    };
                    self.create_image(&raw, self.img_out_n, interlaced)?;
                    if has_trans {
                        self.compute_transparency(tc, self.img_out_n);
                        // The key becomes a real alpha channel.
                        self.img_n = self.img_out_n;
                    }
                    if pal_img_n != 0 {
                        self.img_n = pal_img_n;
                        self.img_out_n = if req >= 3 { req } else { pal_img_n };
                        self.expand_palette(&palette, self.img_out_n)?;
                    }
                    return Ok(());
                }

                _ => {
                    // Bit 5 of the first type byte clear means critical.
                    if kind & (1 << 29) == 0 {
                        return Err(Error::unsupported(format!(
                            "unknown critical chunk {:?}",
                            String::from_utf8_lossy(&kind.to_be_bytes())
                        )));
                    }
                    self.reader.skip(length);
                }
            }

            if self.reader.at_end() {
                return Err(Error::corrupt("unexpected end of file"));
            }
            // CRC
            self.reader.get_u32be();
        }
    }
}

/// True when the stream starts with the PNG signature.
pub fn test(reader: &mut ByteReader) -> bool {
    PngDecoder::new(reader, false).parse_file(Scan::Type, 0).is_ok()
}

/// Read dimensions and channel count.
///
/// Palette images report 3 channels, or 4 when a tRNS chunk precedes the
/// image data.
pub fn probe(reader: &mut ByteReader) -> Result<ImageInfo> {
    let mut decoder = PngDecoder::new(reader, false);
    decoder.parse_file(Scan::Header, 0)?;
    Ok(ImageInfo {
        width: decoder.img_x as u32,
        height: decoder.img_y as u32,
        channels: decoder.img_n,
    })
}

/// Decode a PNG into `req` channels (0 keeps the native count).
///
/// With `partial` set, a truncated stream yields the rows that were
/// recovered and leaves the rest zeroed.
pub fn decode(reader: &mut ByteReader, req: usize, partial: bool) -> Result<Decoded> {
    if req > 4 {
        return Err(Error::unsupported(format!("{req} requested channels")));
    }
    let mut decoder = PngDecoder::new(reader, partial);
    decoder.parse_file(Scan::Load, req)?;
    let target = if req == 0 { decoder.img_n } else { req };
    let pixels = crate::color::convert(
        std::mem::take(&mut decoder.out),
        decoder.img_out_n,
        target,
        decoder.img_x,
        decoder.img_y,
    )?;
    Ok(Decoded {
        pixels,
        width: decoder.img_x as u32,
        height: decoder.img_y as u32,
        channels: decoder.img_n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::inflate::adler32;

    fn chunk(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) {
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0, 0, 0, 0]);
    }

    /// Zlib stream of one stored block.
    fn stored(raw: &[u8]) -> Vec<u8> {
        let mut z = vec![0x78, 0x01, 0x01];
        let len = raw.len() as u16;
        z.extend_from_slice(&len.to_le_bytes());
        z.extend_from_slice(&(!len).to_le_bytes());
        z.extend_from_slice(raw);
        z.extend_from_slice(&adler32(raw).to_be_bytes());
        z
    }

    fn png(
        width: u32,
        height: u32,
        color: u8,
        interlace: u8,
        extra: &[(&[u8; 4], Vec<u8>)],
        raw: &[u8],
    ) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, color, 0, 0, interlace]);
        chunk(&mut out, b"IHDR", &ihdr);
        for (tag, payload) in extra {
            chunk(&mut out, tag, payload);
        }
        chunk(&mut out, b"IDAT", &stored(raw));
        chunk(&mut out, b"IEND", &[]);
        out
    }

    fn load(data: &[u8], req: usize) -> Result<Decoded> {
        let mut reader = ByteReader::from_slice(data);
        decode(&mut reader, req, false)
    }

    #[test]
    fn test_paeth_predictor() {
        assert_eq!(paeth(10, 20, 10), 20);
        assert_eq!(paeth(20, 10, 10), 20);
        assert_eq!(paeth(10, 10, 10), 10);
        // p = 15: pa = 5, pb = 5 -> tie goes to a.
        assert_eq!(paeth(10, 20, 15), 10);
    }

    #[test]
    fn test_first_row_filter_substitution() {
        assert_eq!(Filter::from_byte(2, true).unwrap(), Filter::None);
        assert_eq!(Filter::from_byte(3, true).unwrap(), Filter::AvgFirst);
        assert_eq!(Filter::from_byte(4, true).unwrap(), Filter::PaethFirst);
        assert_eq!(Filter::from_byte(1, true).unwrap(), Filter::Sub);
        assert_eq!(Filter::from_byte(4, false).unwrap(), Filter::Paeth);
        assert!(Filter::from_byte(5, false).is_err());
    }

    #[test]
    fn test_unfilter_sub_wrapping() {
        let mut cur = [0u8; 3];
        unfilter_row(Filter::Sub, &[200, 100, 1], &mut cur, &[0; 3], 1, 1);
        assert_eq!(cur, [200, 44, 45]);
    }

    #[test]
    fn test_unfilter_avg_and_up() {
        let prior = [10u8, 20, 30];
        let mut cur = [0u8; 3];
        unfilter_row(Filter::Up, &[1, 1, 1], &mut cur, &prior, 1, 1);
        assert_eq!(cur, [11, 21, 31]);
        unfilter_row(Filter::Avg, &[1, 1, 1], &mut cur, &prior, 1, 1);
        // 1 + 10/2, 1 + (20 + 6)/2, 1 + (30 + 14)/2
        assert_eq!(cur, [6, 14, 23]);
    }

    #[test]
    fn test_unfilter_adds_alpha() {
        let mut cur = [0u8; 4];
        unfilter_row(Filter::None, &[5, 6], &mut cur, &[0; 4], 1, 2);
        assert_eq!(cur, [5, 255, 6, 255]);
    }

    #[test]
    fn test_stored_gray_2x2_to_rgba() {
        let raw = [0, 0, 64, 0, 128, 255];
        let data = png(2, 2, 0, 0, &[], &raw);
        let img = load(&data, 4).unwrap();
        assert_eq!(img.channels, 1);
        assert_eq!(
            img.pixels,
            vec![0, 0, 0, 255, 64, 64, 64, 255, 128, 128, 128, 255, 255, 255, 255, 255]
        );
    }

    #[test]
    fn test_gray_with_req_two_adds_alpha_in_unfilter() {
        let data = png(1, 1, 0, 0, &[], &[0, 77]);
        let img = load(&data, 2).unwrap();
        assert_eq!(img.channels, 1);
        assert_eq!(img.pixels, vec![77, 255]);
    }

    #[test]
    fn test_palette_with_trns() {
        let plte = vec![255, 0, 0, 0, 255, 0];
        let trns = vec![128];
        let raw = [0, 0, 1];
        let data = png(2, 1, 3, 0, &[(b"PLTE", plte), (b"tRNS", trns)], &raw);

        let img = load(&data, 0).unwrap();
        assert_eq!(img.channels, 4);
        assert_eq!(img.pixels, vec![255, 0, 0, 128, 0, 255, 0, 255]);

        let gray = load(&data, 1).unwrap();
        assert_eq!(gray.pixels, vec![76, 149]);
    }

    #[test]
    fn test_palette_expands_to_requested_rgba() {
        let plte = vec![1, 2, 3];
        let data = png(1, 1, 3, 0, &[(b"PLTE", plte)], &[0, 0]);
        let img = load(&data, 4).unwrap();
        assert_eq!(img.channels, 3);
        assert_eq!(img.pixels, vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_rgb_transparency_key() {
        let trns = vec![0, 10, 0, 20, 0, 30];
        let raw = [0, 10, 20, 30, 10, 20, 31];
        let data = png(2, 1, 2, 0, &[(b"tRNS", trns)], &raw);
        let img = load(&data, 0).unwrap();
        assert_eq!(img.channels, 4);
        assert_eq!(img.pixels, vec![10, 20, 30, 0, 10, 20, 31, 255]);
    }

    #[test]
    fn test_probe_palette_reports_trns() {
        let plte = vec![0; 6];
        let data = png(3, 5, 3, 0, &[(b"PLTE", plte.clone()), (b"tRNS", vec![0])], &[0; 4 * 5]);
        let mut reader = ByteReader::from_slice(&data);
        assert_eq!(probe(&mut reader).unwrap().channels, 4);

        let data = png(3, 5, 3, 0, &[(b"PLTE", plte)], &[0; 4 * 5]);
        let mut reader = ByteReader::from_slice(&data);
        let info = probe(&mut reader).unwrap();
        assert_eq!((info.width, info.height, info.channels), (3, 5, 3));
    }

    #[test]
    fn test_adam7_small_image() {
        // 2x2 gray: pass 1 holds (0,0), pass 6 holds (1,0), pass 7 holds row 1.
        let raw = [0, 11, 0, 22, 0, 33, 44];
        let data = png(2, 2, 0, 1, &[], &raw);
        let img = load(&data, 0).unwrap();
        assert_eq!(img.pixels, vec![11, 22, 33, 44]);
    }

    #[test]
    fn test_rejects_16_bit() {
        let mut data = PNG_SIGNATURE.to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&1u32.to_be_bytes());
        ihdr.extend_from_slice(&1u32.to_be_bytes());
        ihdr.extend_from_slice(&[16, 0, 0, 0, 0]);
        chunk(&mut data, b"IHDR", &ihdr);
        assert!(matches!(load(&data, 0), Err(Error::UnsupportedVariant(_))));
    }

    #[test]
    fn test_first_chunk_must_be_ihdr() {
        let mut data = PNG_SIGNATURE.to_vec();
        chunk(&mut data, b"IEND", &[]);
        assert!(matches!(load(&data, 0), Err(Error::CorruptStream(_))));
    }

    #[test]
    fn test_unknown_critical_chunk() {
        let data = png(1, 1, 0, 0, &[(b"ABCD", vec![1, 2])], &[0, 0]);
        assert!(matches!(load(&data, 0), Err(Error::UnsupportedVariant(_))));
    }

    #[test]
    fn test_unknown_ancillary_chunk_skipped() {
        let data = png(1, 1, 0, 0, &[(b"teXt", b"a\0b".to_vec())], &[0, 9]);
        assert_eq!(load(&data, 0).unwrap().pixels, vec![9]);
    }

    #[test]
    fn test_trns_after_idat_rejected() {
        let mut data = PNG_SIGNATURE.to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&1u32.to_be_bytes());
        ihdr.extend_from_slice(&1u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 0, 0, 0, 0]);
        chunk(&mut data, b"IHDR", &ihdr);
        chunk(&mut data, b"IDAT", &stored(&[0, 1]));
        chunk(&mut data, b"tRNS", &[0, 1]);
        chunk(&mut data, b"IEND", &[]);
        assert!(load(&data, 0).is_err());
    }

    #[test]
    fn test_short_raw_data_rejected_unless_partial() {
        // 1x3 gray image with only two rows of data.
        let data = png(1, 3, 0, 0, &[], &[0, 5, 0, 6]);
        assert!(matches!(load(&data, 0), Err(Error::CorruptStream(_))));

        let mut reader = ByteReader::from_slice(&data);
        let img = decode(&mut reader, 0, true).unwrap();
        assert_eq!(img.pixels, vec![5, 6, 0]);
    }

    #[test]
    fn test_huge_dimensions_are_resource_exhausted() {
        let side = MAX_DIMENSION - 1;
        let data = png(side, side, 2, 0, &[], &[]);
        assert!(matches!(load(&data, 0), Err(Error::ResourceExhausted(_))));

        let data = png(MAX_DIMENSION + 1, 1, 0, 0, &[], &[0, 0]);
        assert!(matches!(load(&data, 0), Err(Error::ResourceExhausted(_))));
    }

    /// A 1x1 gray header followed by an IDAT that claims almost 4 GiB.
    fn oversized_idat() -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&1u32.to_be_bytes());
        ihdr.extend_from_slice(&1u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 0, 0, 0, 0]);
        chunk(&mut data, b"IHDR", &ihdr);
        data.extend_from_slice(&0xFFFF_FFF0u32.to_be_bytes());
        data.extend_from_slice(b"IDAT");
        data.extend_from_slice(&stored(&[0, 7]));
        data
    }

    #[test]
    fn test_oversized_idat_length_fails_without_buffering() {
        let data = oversized_idat();
        assert!(matches!(load(&data, 0), Err(Error::CorruptStream(_))));

        let mut stream = std::io::Cursor::new(data);
        let mut reader = ByteReader::from_reader(&mut stream);
        assert!(matches!(decode(&mut reader, 0, false), Err(Error::CorruptStream(_))));
    }

    #[test]
    fn test_idat_read_in_steps() {
        let payload: Vec<u8> = (0..IDAT_READ_STEP * 2 + 17).map(|i| i as u8).collect();
        let mut stream = std::io::Cursor::new(payload.clone());
        let mut reader = ByteReader::from_reader(&mut stream);
        let mut decoder = PngDecoder::new(&mut reader, false);
        let mut data = vec![1, 2, 3];
        decoder.read_idat(&mut data, payload.len()).unwrap();
        assert_eq!(&data[..3], &[1, 2, 3]);
        assert_eq!(&data[3..], &payload[..]);
    }

    #[test]
    fn test_bad_signature() {
        let mut reader = ByteReader::from_slice(b"GIF89a");
        assert!(!test(&mut reader));
    }
}
