//! Baseline JPEG decoder.
//!
//! Supports sequential Huffman-coded JPEG (SOF0/SOF1) with 8-bit precision,
//! one or three components, any sampling factors from 1 to 4, restart
//! intervals, and multiple scans. Progressive and arithmetic-coded files are
//! rejected with [`Error::UnsupportedVariant`].
//!
//! Decoding proceeds in three stages: marker parsing builds the quantization
//! and Huffman tables, every scan decodes its MCUs straight into per-component
//! sample planes, and finally each output row is assembled by upsampling the
//! chroma planes and converting YCbCr to RGB.

use super::huffman::JpegHuffman;
use super::idct::{idct_block, DEZIGZAG};
use super::reader::ByteReader;
use super::{Decoded, ImageInfo};
use crate::error::{checked_size, Error, Result};

/// Placeholder meaning "no marker pending".
const MARKER_NONE: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DHT: u8 = 0xC4;
const DRI: u8 = 0xDD;
const COM: u8 = 0xFE;
const SOF_PROGRESSIVE: u8 = 0xC2;

#[inline]
fn is_sof(m: u8) -> bool {
    m == 0xC0 || m == 0xC1
}

#[inline]
fn is_restart(m: u8) -> bool {
    (0xD0..=0xD7).contains(&m)
}

/// Any start-of-frame other than baseline or extended sequential Huffman.
#[inline]
fn is_unsupported_sof(m: u8) -> bool {
    matches!(m, 0xC2 | 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
}

const BIT_MASK: [u32; 17] = [
    0, 1, 3, 7, 15, 31, 63, 127, 255, 511, 1023, 2047, 4095, 8191, 16383, 32767, 65535,
];

/// How far [`JpegDecoder::decode_header`] should go.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Stop after SOI.
    Type,
    /// Stop after the frame header.
    Header,
    /// Parse the frame header and allocate sample planes.
    Load,
}

#[derive(Default)]
struct Component {
    id: u8,
    h: usize,
    v: usize,
    tq: usize,
    hd: usize,
    ha: usize,
    dc_pred: i32,
    /// Samples actually covered by the image.
    x: usize,
    y: usize,
    /// Plane size padded to whole MCUs.
    w2: usize,
    h2: usize,
    data: Vec<u8>,
}

struct JpegDecoder<'r, 'a> {
    reader: &'r mut ByteReader<'a>,
    huff_dc: [Option<Box<JpegHuffman>>; 4],
    huff_ac: [Option<Box<JpegHuffman>>; 4],
    dequant: [Option<[u8; 64]>; 4],

    img_x: usize,
    img_y: usize,
    img_n: usize,
    comps: [Component; 4],
    h_max: usize,
    v_max: usize,
    mcus_x: usize,
    mcus_y: usize,

    code_buffer: u32,
    code_bits: u32,
    marker: u8,
    nomore: bool,

    scan_n: usize,
    order: [usize; 4],
    restart_interval: u32,
    todo: i32,
}

impl<'r, 'a> JpegDecoder<'r, 'a> {
    fn new(reader: &'r mut ByteReader<'a>) -> Self {
        Self {
            reader,
            huff_dc: Default::default(),
            huff_ac: Default::default(),
            dequant: [None; 4],
            img_x: 0,
            img_y: 0,
            img_n: 0,
            comps: Default::default(),
            h_max: 1,
            v_max: 1,
            mcus_x: 0,
            mcus_y: 0,
            code_buffer: 0,
            code_bits: 0,
            marker: MARKER_NONE,
            nomore: false,
            scan_n: 0,
            order: [0; 4],
            restart_interval: 0,
            todo: 0,
        }
    }

    // ------------------------------------------------------------------
    // Entropy-coded segment
    // ------------------------------------------------------------------

    /// Refill the bit accumulator to more than 24 bits.
    ///
    /// A marker inside the entropy data is remembered and the rest of the
    /// segment reads as zero bits.
    fn grow_buffer(&mut self) {
        while self.code_bits <= 24 {
            let mut b = 0u32;
            if !self.nomore {
                b = self.reader.get_u8() as u32;
                if b == 0xFF {
                    let c = self.reader.get_u8();
                    if c != 0 {
                        self.marker = c;
                        self.nomore = true;
                        b = 0;
                    }
                }
            }
            self.code_buffer |= b << (24 - self.code_bits);
            self.code_bits += 8;
        }
    }

    fn decode_huffman(&mut self, table: &JpegHuffman) -> Result<u8> {
        if self.code_bits < 16 {
            self.grow_buffer();
        }
        let (value, len) = table
            .lookup(self.code_buffer, self.code_bits)
            .ok_or_else(|| Error::corrupt("bad huffman code"))?;
        self.code_buffer <<= len;
        self.code_bits -= len;
        Ok(value)
    }

    /// Read an `n`-bit magnitude and sign-extend it per JPEG's convention.
    fn extend_receive(&mut self, n: u32) -> i32 {
        if n == 0 {
            return 0;
        }
        if self.code_bits < n {
            self.grow_buffer();
        }
        let k = self.code_buffer.rotate_left(n);
        self.code_buffer = k & !BIT_MASK[n as usize];
        let k = (k & BIT_MASK[n as usize]) as i32;
        self.code_bits -= n;
        if k < 1 << (n - 1) {
            k + (-1 << n) + 1
        } else {
            k
        }
    }

    fn decode_block(&mut self, data: &mut [i16; 64], comp: usize) -> Result<()> {
        let (hd, ha) = (self.comps[comp].hd, self.comps[comp].ha);
        let missing = || Error::corrupt("missing huffman table");
        // Move the tables out while the bit accumulator is borrowed mutably.
        let dc_table = self.huff_dc[hd].take().ok_or_else(missing)?;
        let ac_table = match self.huff_ac[ha].take() {
            Some(t) => t,
            None => {
                self.huff_dc[hd] = Some(dc_table);
                return Err(missing());
            }
        };
        let result = self.decode_block_with(data, comp, &dc_table, &ac_table);
        self.huff_dc[hd] = Some(dc_table);
        self.huff_ac[ha] = Some(ac_table);
        result
    }

    fn decode_block_with(
        &mut self,
        data: &mut [i16; 64],
        comp: usize,
        dc_table: &JpegHuffman,
        ac_table: &JpegHuffman,
    ) -> Result<()> {
        if self.code_bits < 16 {
            self.grow_buffer();
        }
        let t = self.decode_huffman(dc_table)? as u32;
        if t > 16 {
            return Err(Error::corrupt("bad huffman code"));
        }

        *data = [0; 64];
        let diff = self.extend_receive(t);
        let dc = self.comps[comp].dc_pred.wrapping_add(diff);
        self.comps[comp].dc_pred = dc;
        data[0] = dc as i16;

        let mut k = 1;
        while k < 64 {
            let rs = self.decode_huffman(ac_table)?;
            let s = (rs & 15) as u32;
            let r = (rs >> 4) as usize;
            if s == 0 {
                if rs != 0xF0 {
                    break;
                }
                k += 16;
            } else {
                k += r;
                data[DEZIGZAG[k]] = self.extend_receive(s) as i16;
                k += 1;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.code_bits = 0;
        self.code_buffer = 0;
        self.nomore = false;
        for comp in &mut self.comps {
            comp.dc_pred = 0;
        }
        self.marker = MARKER_NONE;
        self.todo = if self.restart_interval != 0 {
            self.restart_interval as i32
        } else {
            i32::MAX
        };
    }

    /// Count down the restart interval after one MCU.
    ///
    /// Returns `false` when the scan should end: the interval ran out but no
    /// RSTn marker follows. Some encoders pad the last interval, so this ends
    /// the scan quietly instead of failing.
    fn after_mcu(&mut self) -> bool {
        self.todo -= 1;
        if self.todo > 0 {
            return true;
        }
        if self.code_bits < 24 {
            self.grow_buffer();
        }
        if !is_restart(self.marker) {
            log::trace!("restart interval ended without RST marker");
            return false;
        }
        self.reset();
        true
    }

    fn parse_entropy_coded_data(&mut self) -> Result<()> {
        self.reset();
        let mut data = [0i16; 64];

        if self.scan_n == 1 {
            let n = self.order[0];
            let tq = self.comps[n].tq;
            let dequant = self.dequant[tq].ok_or_else(|| Error::corrupt("missing quant table"))?;
            let w = (self.comps[n].x + 7) >> 3;
            let h = (self.comps[n].y + 7) >> 3;
            for j in 0..h {
                for i in 0..w {
                    self.decode_block(&mut data, n)?;
                    let comp = &mut self.comps[n];
                    let offset = comp.w2 * j * 8 + i * 8;
                    idct_block(&mut comp.data[offset..], comp.w2, &data, &dequant);
                    if !self.after_mcu() {
                        return Ok(());
                    }
                }
            }
            return Ok(());
        }

        for j in 0..self.mcus_y {
            for i in 0..self.mcus_x {
                for k in 0..self.scan_n {
                    let n = self.order[k];
                    let tq = self.comps[n].tq;
                    let dequant =
                        self.dequant[tq].ok_or_else(|| Error::corrupt("missing quant table"))?;
                    for y in 0..self.comps[n].v {
                        for x in 0..self.comps[n].h {
                            self.decode_block(&mut data, n)?;
                            let comp = &mut self.comps[n];
                            let x2 = (i * comp.h + x) * 8;
                            let y2 = (j * comp.v + y) * 8;
                            let offset = comp.w2 * y2 + x2;
                            idct_block(&mut comp.data[offset..], comp.w2, &data, &dequant);
                        }
                    }
                }
                if !self.after_mcu() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Markers and headers
    // ------------------------------------------------------------------

    fn get_marker(&mut self) -> u8 {
        if self.marker != MARKER_NONE {
            let m = self.marker;
            self.marker = MARKER_NONE;
            return m;
        }
        let mut x = self.reader.get_u8();
        if x != 0xFF {
            return MARKER_NONE;
        }
        while x == 0xFF {
            x = self.reader.get_u8();
        }
        x
    }

    fn process_marker(&mut self, m: u8) -> Result<()> {
        log::trace!("jpeg marker {m:#04X}");
        match m {
            MARKER_NONE => Err(Error::corrupt("expected marker")),
            SOF_PROGRESSIVE => Err(Error::unsupported("progressive jpeg")),
            _ if is_unsupported_sof(m) => Err(Error::unsupported(format!(
                "jpeg frame type {m:#04X}"
            ))),
            DRI => {
                if self.reader.get_u16be() != 4 {
                    return Err(Error::corrupt("bad DRI len"));
                }
                self.restart_interval = self.reader.get_u16be() as u32;
                Ok(())
            }
            DQT => {
                let mut len = self.reader.get_u16be() as i32 - 2;
                while len > 0 {
                    let q = self.reader.get_u8();
                    let precision = q >> 4;
                    let t = (q & 15) as usize;
                    if precision != 0 {
                        return Err(Error::corrupt("bad DQT type"));
                    }
                    if t > 3 {
                        return Err(Error::corrupt("bad DQT table"));
                    }
                    let mut table = [0u8; 64];
                    for &pos in DEZIGZAG.iter().take(64) {
                        table[pos] = self.reader.get_u8();
                    }
                    self.dequant[t] = Some(table);
                    len -= 65;
                }
                if len != 0 {
                    return Err(Error::corrupt("bad DQT length"));
                }
                Ok(())
            }
            DHT => {
                let mut len = self.reader.get_u16be() as i32 - 2;
                while len > 0 {
                    let q = self.reader.get_u8();
                    let tc = q >> 4;
                    let th = (q & 15) as usize;
                    if tc > 1 || th > 3 {
                        return Err(Error::corrupt("bad DHT header"));
                    }
                    let mut counts = [0u8; 16];
                    let mut n = 0usize;
                    for count in &mut counts {
                        *count = self.reader.get_u8();
                        n += *count as usize;
                    }
                    if n > 256 {
                        return Err(Error::corrupt("bad DHT header"));
                    }
                    let mut symbols = [0u8; 256];
                    for sym in symbols.iter_mut().take(n) {
                        *sym = self.reader.get_u8();
                    }
                    let table = Box::new(JpegHuffman::new(&counts, &symbols[..n])?);
                    if tc == 0 {
                        self.huff_dc[th] = Some(table);
                    } else {
                        self.huff_ac[th] = Some(table);
                    }
                    len -= 17 + n as i32;
                }
                if len != 0 {
                    return Err(Error::corrupt("bad DHT length"));
                }
                Ok(())
            }
            0xE0..=0xEF | COM => {
                let len = self.reader.get_u16be() as usize;
                self.reader.skip(len.saturating_sub(2));
                Ok(())
            }
            _ => Err(Error::corrupt(format!("unknown marker {m:#04X}"))),
        }
    }

    fn process_scan_header(&mut self) -> Result<()> {
        let ls = self.reader.get_u16be() as usize;
        self.scan_n = self.reader.get_u8() as usize;
        if self.scan_n < 1 || self.scan_n > 4 || self.scan_n > self.img_n {
            return Err(Error::corrupt("bad SOS component count"));
        }
        if ls != 6 + 2 * self.scan_n {
            return Err(Error::corrupt("bad SOS len"));
        }
        for i in 0..self.scan_n {
            let id = self.reader.get_u8();
            let q = self.reader.get_u8();
            let which = self.comps[..self.img_n]
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| Error::corrupt("bad SOS component id"))?;
            let hd = (q >> 4) as usize;
            let ha = (q & 15) as usize;
            if hd > 3 {
                return Err(Error::corrupt("bad DC huff"));
            }
            if ha > 3 {
                return Err(Error::corrupt("bad AC huff"));
            }
            self.comps[which].hd = hd;
            self.comps[which].ha = ha;
            self.order[i] = which;
        }
        if self.reader.get_u8() != 0 {
            return Err(Error::corrupt("bad SOS"));
        }
        // Spectral end, nominally 63; some encoders write 0.
        self.reader.get_u8();
        if self.reader.get_u8() != 0 {
            return Err(Error::corrupt("bad SOS"));
        }
        Ok(())
    }

    fn process_frame_header(&mut self, scan: Scan) -> Result<()> {
        let lf = self.reader.get_u16be() as usize;
        if lf < 11 {
            return Err(Error::corrupt("bad SOF len"));
        }
        let precision = self.reader.get_u8();
        if precision != 8 {
            return Err(Error::unsupported("only 8-bit jpeg samples"));
        }
        self.img_y = self.reader.get_u16be() as usize;
        if self.img_y == 0 {
            return Err(Error::unsupported("delayed height (DNL)"));
        }
        self.img_x = self.reader.get_u16be() as usize;
        if self.img_x == 0 {
            return Err(Error::corrupt("0 width"));
        }
        let c = self.reader.get_u8() as usize;
        if c != 1 && c != 3 {
            return Err(Error::corrupt("bad component count"));
        }
        self.img_n = c;
        if lf != 8 + 3 * c {
            return Err(Error::corrupt("bad SOF len"));
        }

        for i in 0..c {
            let comp = &mut self.comps[i];
            comp.id = self.reader.get_u8();
            if comp.id as usize != i + 1 && comp.id as usize != i {
                return Err(Error::corrupt("bad component ID"));
            }
            let q = self.reader.get_u8();
            comp.h = (q >> 4) as usize;
            comp.v = (q & 15) as usize;
            if !(1..=4).contains(&comp.h) {
                return Err(Error::corrupt("bad H"));
            }
            if !(1..=4).contains(&comp.v) {
                return Err(Error::corrupt("bad V"));
            }
            comp.tq = self.reader.get_u8() as usize;
            if comp.tq > 3 {
                return Err(Error::corrupt("bad TQ"));
            }
        }

        if scan != Scan::Load {
            return Ok(());
        }

        if (1usize << 30) / self.img_x / self.img_n < self.img_y {
            return Err(Error::ResourceExhausted("image too large to decode".into()));
        }

        self.h_max = self.comps[..c].iter().map(|c| c.h).max().unwrap_or(1);
        self.v_max = self.comps[..c].iter().map(|c| c.v).max().unwrap_or(1);
        let mcu_w = self.h_max * 8;
        let mcu_h = self.v_max * 8;
        self.mcus_x = (self.img_x + mcu_w - 1) / mcu_w;
        self.mcus_y = (self.img_y + mcu_h - 1) / mcu_h;

        for comp in &mut self.comps[..c] {
            comp.x = (self.img_x * comp.h + self.h_max - 1) / self.h_max;
            comp.y = (self.img_y * comp.v + self.v_max - 1) / self.v_max;
            comp.w2 = self.mcus_x * comp.h * 8;
            comp.h2 = self.mcus_y * comp.v * 8;
            let size = checked_size(comp.w2, comp.h2, 1)?;
            let mut data = Vec::new();
            data.try_reserve_exact(size)
                .map_err(|_| Error::ResourceExhausted("jpeg component plane".into()))?;
            data.resize(size, 0);
            comp.data = data;
        }

        log::debug!(
            "jpeg {}x{} components={} sampling={:?} restart={}",
            self.img_x,
            self.img_y,
            c,
            self.comps[..c]
                .iter()
                .map(|c| (c.h, c.v))
                .collect::<Vec<_>>(),
            self.restart_interval
        );
        Ok(())
    }

    fn decode_header(&mut self, scan: Scan) -> Result<()> {
        self.marker = MARKER_NONE;
        if self.get_marker() != SOI {
            return Err(Error::corrupt("no SOI"));
        }
        if scan == Scan::Type {
            return Ok(());
        }
        let mut m = self.get_marker();
        while !is_sof(m) {
            self.process_marker(m)?;
            m = self.get_marker();
            while m == MARKER_NONE {
                if self.reader.at_end() {
                    return Err(Error::corrupt("no SOF"));
                }
                m = self.get_marker();
            }
        }
        self.process_frame_header(scan)
    }

    fn decode_image(&mut self) -> Result<()> {
        self.restart_interval = 0;
        self.decode_header(Scan::Load)?;
        let mut m = self.get_marker();
        while m != EOI {
            if m == SOS {
                self.process_scan_header()?;
                self.parse_entropy_coded_data()?;
                if self.marker == MARKER_NONE {
                    // Tolerate zero padding between the scan and the next marker.
                    while !self.reader.at_end() {
                        let x = self.reader.get_u8();
                        if x == 0xFF {
                            self.marker = self.reader.get_u8();
                            break;
                        } else if x != 0 {
                            return Err(Error::corrupt("junk before marker"));
                        }
                    }
                }
            } else {
                self.process_marker(m)?;
            }
            m = self.get_marker();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Output assembly
    // ------------------------------------------------------------------

    fn assemble(&mut self, req: usize) -> Result<Vec<u8>> {
        let n = if req != 0 { req } else { self.img_n };
        let decode_n = if self.img_n == 3 && n < 3 { 1 } else { self.img_n };
        let width = self.img_x;

        let mut resamplers: Vec<Resampler> = self.comps[..decode_n]
            .iter()
            .map(|comp| {
                let hs = self.h_max / comp.h;
                let vs = self.v_max / comp.v;
                Resampler {
                    hs,
                    vs,
                    ystep: vs >> 1,
                    w_lores: (width + hs - 1) / hs,
                    ypos: 0,
                    line0: 0,
                    line1: 0,
                    kernel: Kernel::select(hs, vs),
                }
            })
            .collect();

        let mut lines = vec![vec![0u8; width + 3]; decode_n];
        let mut output = vec![0u8; checked_size(width, self.img_y, n)?];

        for row in output.chunks_exact_mut(n * width) {
            for (k, r) in resamplers.iter_mut().enumerate() {
                let comp = &self.comps[k];
                let y_bot = r.ystep >= (r.vs >> 1);
                let (near, far) = if y_bot {
                    (r.line1, r.line0)
                } else {
                    (r.line0, r.line1)
                };
                let in_near = &comp.data[near..near + r.w_lores];
                let in_far = &comp.data[far..far + r.w_lores];
                r.kernel.run(&mut lines[k], in_near, in_far, r.w_lores, r.hs);

                r.ystep += 1;
                if r.ystep >= r.vs {
                    r.ystep = 0;
                    r.line0 = r.line1;
                    r.ypos += 1;
                    if r.ypos < comp.y {
                        r.line1 += comp.w2;
                    }
                }
            }

            let y = &lines[0][..width];
            if n >= 3 {
                if self.img_n == 3 {
                    ycbcr_to_rgb_row(row, y, &lines[1][..width], &lines[2][..width], n);
                } else {
                    for (px, &g) in row.chunks_exact_mut(n).zip(y) {
                        px[0] = g;
                        px[1] = g;
                        px[2] = g;
                        if n == 4 {
                            px[3] = 255;
                        }
                    }
                }
            } else if n == 1 {
                row.copy_from_slice(y);
            } else {
                for (px, &g) in row.chunks_exact_mut(2).zip(y) {
                    px[0] = g;
                    px[1] = 255;
                }
            }
        }
        Ok(output)
    }
}

/// Per-component upsampling state while emitting output rows.
struct Resampler {
    hs: usize,
    vs: usize,
    ystep: usize,
    w_lores: usize,
    ypos: usize,
    /// Offsets of the two source rows bracketing the output row.
    line0: usize,
    line1: usize,
    kernel: Kernel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kernel {
    Row1,
    V2,
    H2,
    Hv2,
    Generic,
}

impl Kernel {
    fn select(hs: usize, vs: usize) -> Self {
        match (hs, vs) {
            (1, 1) => Kernel::Row1,
            (1, 2) => Kernel::V2,
            (2, 1) => Kernel::H2,
            (2, 2) => Kernel::Hv2,
            _ => Kernel::Generic,
        }
    }

    fn run(self, out: &mut [u8], near: &[u8], far: &[u8], w: usize, hs: usize) {
        match self {
            Kernel::Row1 => out[..w].copy_from_slice(near),
            Kernel::V2 => resample_v2(out, near, far),
            Kernel::H2 => resample_h2(out, near),
            Kernel::Hv2 => resample_hv2(out, near, far),
            Kernel::Generic => resample_generic(out, near, hs),
        }
    }
}

#[inline]
fn div4(x: u32) -> u8 {
    (x >> 2) as u8
}

#[inline]
fn div16(x: u32) -> u8 {
    (x >> 4) as u8
}

/// Vertical 2x: weight the nearer row 3:1.
fn resample_v2(out: &mut [u8], near: &[u8], far: &[u8]) {
    for ((o, &n), &f) in out.iter_mut().zip(near).zip(far) {
        *o = div4(3 * n as u32 + f as u32 + 2);
    }
}

/// Horizontal 2x: each sample becomes two, each weighted 3:1 toward itself.
fn resample_h2(out: &mut [u8], input: &[u8]) {
    let w = input.len();
    if w == 1 {
        out[0] = input[0];
        out[1] = input[0];
        return;
    }
    out[0] = input[0];
    out[1] = div4(input[0] as u32 * 3 + input[1] as u32 + 2);
    for i in 1..w - 1 {
        let n = 3 * input[i] as u32 + 2;
        out[i * 2] = div4(n + input[i - 1] as u32);
        out[i * 2 + 1] = div4(n + input[i + 1] as u32);
    }
    let i = w - 1;
    out[i * 2] = div4(input[w - 2] as u32 * 3 + input[w - 1] as u32 + 2);
    out[i * 2 + 1] = input[w - 1];
}

/// 2x in both directions: vertical 3:1 blend, then horizontal 3:1 blend.
fn resample_hv2(out: &mut [u8], near: &[u8], far: &[u8]) {
    let w = near.len();
    if w == 1 {
        let v = div4(3 * near[0] as u32 + far[0] as u32 + 2);
        out[0] = v;
        out[1] = v;
        return;
    }
    let mut t1 = 3 * near[0] as u32 + far[0] as u32;
    out[0] = div4(t1 + 2);
    for i in 1..w {
        let t0 = t1;
        t1 = 3 * near[i] as u32 + far[i] as u32;
        out[i * 2 - 1] = div16(3 * t0 + t1 + 8);
        out[i * 2] = div16(3 * t1 + t0 + 8);
    }
    out[w * 2 - 1] = div4(t1 + 2);
}

/// Any other ratio: nearest-neighbor replication.
fn resample_generic(out: &mut [u8], near: &[u8], hs: usize) {
    for (i, &v) in near.iter().enumerate() {
        out[i * hs..i * hs + hs].fill(v);
    }
}

// 16.16 fixed-point conversion factors.
const CR_TO_R: i32 = 91881;
const CR_TO_G: i32 = 46802;
const CB_TO_G: i32 = 22554;
const CB_TO_B: i32 = 116130;

/// Convert one row of YCbCr samples into `step`-byte RGB(A) pixels.
fn ycbcr_to_rgb_row(out: &mut [u8], y: &[u8], cb: &[u8], cr: &[u8], step: usize) {
    for (((px, &y), &cb), &cr) in out.chunks_exact_mut(step).zip(y).zip(cb).zip(cr) {
        let y_fixed = ((y as i32) << 16) + 32768;
        let cr = cr as i32 - 128;
        let cb = cb as i32 - 128;
        let r = (y_fixed + cr * CR_TO_R) >> 16;
        let g = (y_fixed - cr * CR_TO_G - cb * CB_TO_G) >> 16;
        let b = (y_fixed + cb * CB_TO_B) >> 16;
        px[0] = r.clamp(0, 255) as u8;
        px[1] = g.clamp(0, 255) as u8;
        px[2] = b.clamp(0, 255) as u8;
        if step == 4 {
            px[3] = 255;
        }
    }
}

/// True when the stream starts with an SOI marker.
pub fn test(reader: &mut ByteReader) -> bool {
    let mut decoder = JpegDecoder::new(reader);
    decoder.decode_header(Scan::Type).is_ok()
}

/// Read dimensions and component count up to the frame header.
pub fn probe(reader: &mut ByteReader) -> Result<ImageInfo> {
    let mut decoder = JpegDecoder::new(reader);
    decoder.decode_header(Scan::Header)?;
    Ok(ImageInfo {
        width: decoder.img_x as u32,
        height: decoder.img_y as u32,
        channels: decoder.img_n,
    })
}

/// Decode a baseline JPEG into `req` channels (0 keeps the native count).
pub fn decode(reader: &mut ByteReader, req: usize) -> Result<Decoded> {
    if req > 4 {
        return Err(Error::unsupported(format!("{req} requested channels")));
    }
    let mut decoder = JpegDecoder::new(reader);
    decoder.decode_image()?;
    let pixels = decoder.assemble(req)?;
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

    /// Segment helper: marker followed by a length-prefixed payload.
    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// A 8x8 grayscale JPEG whose only nonzero coefficient is DC.
    ///
    /// DC table: a single 1-bit code (symbol `dc_size`). AC table: a single
    /// 1-bit code for EOB. Entropy data is `0` (DC code), the magnitude bits,
    /// then `0` (EOB), padded with ones.
    fn flat_gray_jpeg(dc_size: u8, magnitude: u8, restart: Option<u16>) -> Vec<u8> {
        let mut out = vec![0xFF, SOI];
        let mut dqt = vec![0u8];
        dqt.extend_from_slice(&[1u8; 64]);
        out.extend(segment(DQT, &dqt));

        let mut dht = vec![0x00, 1];
        dht.extend_from_slice(&[0; 15]);
        dht.push(dc_size);
        dht.push(0x10);
        dht.push(1);
        dht.extend_from_slice(&[0; 15]);
        dht.push(0x00);
        out.extend(segment(DHT, &dht));

        if let Some(interval) = restart {
            out.extend(segment(DRI, &interval.to_be_bytes()));
        }

        out.extend(segment(0xC0, &[8, 0, 8, 0, 8, 1, 1, 0x11, 0]));
        out.extend(segment(SOS, &[1, 1, 0x00, 0, 63, 0]));

        // 0 | magnitude bits | 0 | ones
        let bits = 1 + dc_size as u32 + 1;
        let mut word: u32 = (magnitude as u32) << (32 - 1 - dc_size as u32);
        word |= u32::MAX >> bits;
        for b in word.to_be_bytes() {
            out.push(b);
            if b == 0xFF {
                out.push(0);
            }
        }
        out.extend_from_slice(&[0xFF, EOI]);
        out
    }

    #[test]
    fn test_decode_flat_gray() {
        // DC size 4, magnitude 0b1000 = +8 -> 128 + 8 / 8 = 129.
        let data = flat_gray_jpeg(4, 0b1000, None);
        let mut reader = ByteReader::from_slice(&data);
        let img = decode(&mut reader, 0).unwrap();
        assert_eq!((img.width, img.height, img.channels), (8, 8, 1));
        assert!(img.pixels.iter().all(|&p| p == 129), "{:?}", img.pixels);
    }

    #[test]
    fn test_negative_dc_magnitude() {
        // 0b0111 with size 4 decodes to 7 - 15 = -8 -> 127.
        let data = flat_gray_jpeg(4, 0b0111, None);
        let mut reader = ByteReader::from_slice(&data);
        let img = decode(&mut reader, 1).unwrap();
        assert!(img.pixels.iter().all(|&p| p == 127));
    }

    #[test]
    fn test_gray_expands_to_rgba() {
        let data = flat_gray_jpeg(4, 0b1000, None);
        let mut reader = ByteReader::from_slice(&data);
        let img = decode(&mut reader, 4).unwrap();
        assert_eq!(img.channels, 1);
        assert_eq!(img.pixels.len(), 8 * 8 * 4);
        assert_eq!(&img.pixels[..4], &[129, 129, 129, 255]);
    }

    #[test]
    fn test_restart_interval_without_marker_is_tolerated() {
        let data = flat_gray_jpeg(4, 0b1000, Some(1));
        let mut reader = ByteReader::from_slice(&data);
        let img = decode(&mut reader, 1).unwrap();
        assert!(img.pixels.iter().all(|&p| p == 129));
    }

    #[test]
    fn test_probe_reads_frame_header() {
        let data = flat_gray_jpeg(4, 0b1000, None);
        let mut reader = ByteReader::from_slice(&data);
        let info = probe(&mut reader).unwrap();
        assert_eq!(
            info,
            ImageInfo {
                width: 8,
                height: 8,
                channels: 1
            }
        );
    }

    #[test]
    fn test_progressive_rejected() {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(SOF_PROGRESSIVE, &[8, 0, 8, 0, 8, 1, 1, 0x11, 0]));
        let mut reader = ByteReader::from_slice(&data);
        assert!(matches!(
            decode(&mut reader, 0),
            Err(Error::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn test_twelve_bit_rejected() {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(0xC1, &[12, 0, 8, 0, 8, 1, 1, 0x11, 0]));
        let mut reader = ByteReader::from_slice(&data);
        assert!(matches!(
            probe(&mut reader),
            Err(Error::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn test_missing_soi() {
        let mut reader = ByteReader::from_slice(&[0x89, b'P', b'N', b'G']);
        assert!(!test(&mut reader));
    }

    #[test]
    fn test_missing_tables_is_corrupt() {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(0xC0, &[8, 0, 8, 0, 8, 1, 1, 0x11, 0]));
        data.extend(segment(SOS, &[1, 1, 0x00, 0, 63, 0]));
        data.extend_from_slice(&[0, 0, 0xFF, EOI]);
        let mut reader = ByteReader::from_slice(&data);
        assert!(matches!(
            decode(&mut reader, 0),
            Err(Error::CorruptStream(_))
        ));
    }

    #[test]
    fn test_bad_component_count() {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(0xC0, &[8, 0, 8, 0, 8, 2, 1, 0x11, 0, 2, 0x11, 0]));
        let mut reader = ByteReader::from_slice(&data);
        assert!(probe(&mut reader).is_err());
    }

    #[test]
    fn test_extend_receive_sign() {
        let mut reader = ByteReader::from_slice(&[]);
        let mut decoder = JpegDecoder::new(&mut reader);
        decoder.code_buffer = 0b101 << 29;
        decoder.code_bits = 32;
        assert_eq!(decoder.extend_receive(3), 5);
        decoder.code_buffer = 0b010 << 29;
        decoder.code_bits = 32;
        assert_eq!(decoder.extend_receive(3), -5);
    }

    #[test]
    fn test_resample_h2_edges() {
        let mut out = [0u8; 6];
        resample_h2(&mut out, &[0, 100, 200]);
        assert_eq!(out, [0, 25, 75, 125, 125, 200]);

        let mut out = [0u8; 2];
        resample_h2(&mut out, &[9]);
        assert_eq!(out, [9, 9]);
    }

    #[test]
    fn test_resample_v2_weights_near_row() {
        let mut out = [0u8; 2];
        resample_v2(&mut out, &[100, 0], &[0, 100]);
        assert_eq!(out, [75, 25]);
    }

    #[test]
    fn test_resample_hv2_flat_stays_flat() {
        let mut out = [0u8; 8];
        resample_hv2(&mut out, &[80; 4], &[80; 4]);
        assert_eq!(out, [80; 8]);
    }

    #[test]
    fn test_resample_generic_replicates() {
        let mut out = [0u8; 6];
        resample_generic(&mut out, &[1, 2], 3);
        assert_eq!(out, [1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_ycbcr_neutral_chroma_is_gray() {
        let mut out = [0u8; 8];
        ycbcr_to_rgb_row(&mut out, &[0, 200], &[128, 128], &[128, 128], 4);
        assert_eq!(out, [0, 0, 0, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn test_ycbcr_pure_red() {
        // Y/Cb/Cr for (255, 0, 0) per JFIF.
        let mut out = [0u8; 3];
        ycbcr_to_rgb_row(&mut out, &[76], &[85], &[255], 3);
        assert!(out[0] >= 250 && out[1] <= 5 && out[2] <= 5, "{out:?}");
    }
}
