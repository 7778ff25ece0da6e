//! Fixed-point 8x8 inverse DCT for baseline JPEG.
//!
//! Separable: a column pass keeps two extra bits of precision, the row pass
//! removes the remaining scale, level-shifts by 128 and clamps to `0..=255`.
//! Constants are the usual AAN-style rotations scaled by 4096.

/// Zig-zag position to natural (row-major) position.
///
/// Padded with 15 trailing entries so a corrupt run length can overshoot
/// index 63 without leaving the table.
pub const DEZIGZAG: [usize; 64 + 15] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63, // padding
    63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63,
];

// round(x * 4096) for the rotation constants
const C_0_541: i64 = 2217;
const C_N1_847: i64 = -7567;
const C_0_765: i64 = 3135;
const C_1_175: i64 = 4816;
const C_0_298: i64 = 1223;
const C_2_053: i64 = 8410;
const C_3_072: i64 = 12586;
const C_1_501: i64 = 6149;
const C_N0_899: i64 = -3685;
const C_N2_562: i64 = -10497;
const C_N1_961: i64 = -8034;
const C_N0_390: i64 = -1597;

/// Even part `x0..x3` and odd part `t0..t3` of a 1-D pass.
struct Butterfly {
    x: [i64; 4],
    t: [i64; 4],
}

#[inline(always)]
fn idct_1d(s: [i64; 8]) -> Butterfly {
    let p1 = (s[2] + s[6]) * C_0_541;
    let t2 = p1 + s[6] * C_N1_847;
    let t3 = p1 + s[2] * C_0_765;
    let t0 = (s[0] + s[4]) << 12;
    let t1 = (s[0] - s[4]) << 12;
    let x = [t0 + t3, t1 + t2, t1 - t2, t0 - t3];

    let (mut t0, mut t1, mut t2, mut t3) = (s[7], s[5], s[3], s[1]);
    let p3 = t0 + t2;
    let p4 = t1 + t3;
    let p1 = t0 + t3;
    let p2 = t1 + t2;
    let p5 = (p3 + p4) * C_1_175;
    t0 *= C_0_298;
    t1 *= C_2_053;
    t2 *= C_3_072;
    t3 *= C_1_501;
    let p1 = p5 + p1 * C_N0_899;
    let p2 = p5 + p2 * C_N2_562;
    let p3 = p3 * C_N1_961;
    let p4 = p4 * C_N0_390;
    t3 += p1 + p4;
    t2 += p2 + p3;
    t1 += p2 + p4;
    t0 += p1 + p3;

    Butterfly {
        x,
        t: [t0, t1, t2, t3],
    }
}

#[inline(always)]
fn clamp(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

/// Dequantize `coeffs` (natural order) and write the reconstructed 8x8
/// block into `out`, one row every `stride` bytes.
pub fn idct_block(out: &mut [u8], stride: usize, coeffs: &[i16; 64], dequant: &[u8; 64]) {
    let mut val = [0i64; 64];

    for i in 0..8 {
        let d = |row: usize| coeffs[row * 8 + i] as i64 * dequant[row * 8 + i] as i64;
        if (1..8).all(|row| coeffs[row * 8 + i] == 0) {
            let dcterm = d(0) << 2;
            for row in 0..8 {
                val[row * 8 + i] = dcterm;
            }
        } else {
            let Butterfly { x, t } = idct_1d([d(0), d(1), d(2), d(3), d(4), d(5), d(6), d(7)]);
            let x = x.map(|v| v + 512);
            val[i] = (x[0] + t[3]) >> 10;
            val[56 + i] = (x[0] - t[3]) >> 10;
            val[8 + i] = (x[1] + t[2]) >> 10;
            val[48 + i] = (x[1] - t[2]) >> 10;
            val[16 + i] = (x[2] + t[1]) >> 10;
            val[40 + i] = (x[2] - t[1]) >> 10;
            val[24 + i] = (x[3] + t[0]) >> 10;
            val[32 + i] = (x[3] - t[0]) >> 10;
        }
    }

    for (row, v) in val.chunks_exact(8).enumerate() {
        let Butterfly { x, t } = idct_1d([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
        // Round, remove the 1<<17 scale and level-shift by 128 in one add.
        let x = x.map(|v| v + 65536 + (128 << 17));
        let o = &mut out[row * stride..row * stride + 8];
        o[0] = clamp((x[0] + t[3]) >> 17);
        o[7] = clamp((x[0] - t[3]) >> 17);
        o[1] = clamp((x[1] + t[2]) >> 17);
        o[6] = clamp((x[1] - t[2]) >> 17);
        o[2] = clamp((x[2] + t[1]) >> 17);
        o[5] = clamp((x[2] - t[1]) >> 17);
        o[3] = clamp((x[3] + t[0]) >> 17);
        o[4] = clamp((x[3] - t[0]) >> 17);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(coeffs: &[i16; 64], q: u8) -> [u8; 64] {
        let mut out = [0u8; 64];
        idct_block(&mut out, 8, coeffs, &[q; 64]);
        out
    }

    #[test]
    fn test_dezigzag_is_permutation() {
        let mut seen = [false; 64];
        for &idx in &DEZIGZAG[..64] {
            assert!(!seen[idx]);
            seen[idx] = true;
        }
        assert!(DEZIGZAG[64..].iter().all(|&i| i == 63));
    }

    #[test]
    fn test_zero_block_is_mid_gray() {
        assert!(run(&[0; 64], 1).iter().all(|&p| p == 128));
    }

    #[test]
    fn test_dc_only_is_flat() {
        let mut coeffs = [0i16; 64];
        coeffs[0] = 8;
        assert!(run(&coeffs, 8).iter().all(|&p| p == 136));

        coeffs[0] = -16;
        assert!(run(&coeffs, 8).iter().all(|&p| p == 112));
    }

    #[test]
    fn test_clamps_extremes() {
        let mut coeffs = [0i16; 64];
        coeffs[0] = 2000;
        assert!(run(&coeffs, 255).iter().all(|&p| p == 255));
        coeffs[0] = -2000;
        assert!(run(&coeffs, 255).iter().all(|&p| p == 0));
    }

    #[test]
    fn test_horizontal_frequency_gives_identical_rows() {
        let mut coeffs = [0i16; 64];
        coeffs[1] = 40;
        let out = run(&coeffs, 1);
        for row in 1..8 {
            assert_eq!(out[row * 8..row * 8 + 8], out[..8]);
        }
        // First harmonic: bright on the left, dark on the right.
        assert!(out[0] > 128 && out[7] < 128);
        assert!(out[0] > out[3]);
    }

    #[test]
    fn test_respects_stride() {
        let mut coeffs = [0i16; 64];
        coeffs[0] = 8;
        let mut out = [0u8; 16 * 8];
        idct_block(&mut out, 16, &coeffs, &[8; 64]);
        for row in 0..8 {
            assert!(out[row * 16..row * 16 + 8].iter().all(|&p| p == 136));
            assert!(out[row * 16 + 8..row * 16 + 16].iter().all(|&p| p == 0));
        }
    }
}
