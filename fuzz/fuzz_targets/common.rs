// SPDX-License-Identifier: MIT OR Apache-2.0

pub const MAX_SAMPLES: usize = 512;

/// Maps `seed` into `[min, max]`.
pub fn bounded(seed: u8, min: usize, max: usize) -> usize {
    if max <= min {
        return min;
    }
    min + usize::from(seed) % (max - min + 1)
}

/// Decodes little-endian `i16` pairs into bounded sample values.
pub fn samples(data: &[u8], scale: f64) -> Vec<f64> {
    data.chunks_exact(2)
        .take(MAX_SAMPLES)
        .map(|pair| f64::from(i16::from_le_bytes([pair[0], pair[1]])) / scale)
        .collect()
}

/// Takes one byte from the front of `data`, or zero when exhausted.
pub fn take_byte(data: &mut &[u8]) -> u8 {
    match data.split_first() {
        Some((&byte, rest)) => {
            *data = rest;
            byte
        }
        None => 0,
    }
}
