//! Synthetic test image generation.
//!
//! Deterministic patterns for decoder and compositing tests. Random
//! content always comes from a seeded `StdRng`.

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random bytes for a `width` x `height` image with `channels` samples.
pub fn random_pixels(width: u32, height: u32, channels: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pixels = vec![0u8; width as usize * height as usize * channels];
    rng.fill(pixels.as_mut_slice());
    pixels
}

/// Smooth RGB gradient, friendly to lossy codecs.
pub fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (((x + y) * 127) / (width + height).max(1)) as u8;
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

/// Smooth grayscale gradient.
pub fn gradient_gray(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push((((x + y) * 255) / (width + height).max(1)) as u8);
        }
    }
    pixels
}

/// RGBA image whose pixels cycle through `colors`, column-major stripes.
pub fn stripes_rgba(width: u32, height: u32, colors: &[[u8; 4]]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&colors[((x + 2 * y) as usize) % colors.len()]);
        }
    }
    pixels
}

/// Add an opaque alpha channel to RGB samples.
pub fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect()
}

/// Largest per-sample difference between two buffers.
pub fn max_abs_diff(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}

/// Mean per-sample difference between two buffers.
pub fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let total: u64 = a.iter().zip(b).map(|(&x, &y)| x.abs_diff(y) as u64).sum();
    total as f64 / a.len() as f64
}
