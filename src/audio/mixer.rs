// SIMD mixing of click voices into the output block

use wide::f32x4;

/// Sums click voices into a mono block. Zero allocations; safe in the audio callback.
#[derive(Debug, Default)]
pub struct VoiceMixer;

impl VoiceMixer {
    pub fn new() -> Self {
        Self
    }

    pub fn clear(&self, buffer: &mut [f32]) {
        buffer.fill(0.0);
    }

    /// `dest += src * gain` over the common length.
    pub fn add(&self, dest: &mut [f32], src: &[f32], gain: f32) {
        let len = dest.len().min(src.len());
        let gain_vec = f32x4::splat(gain);
        let chunks = len / 4;

        for i in 0..chunks {
            let idx = i * 4;
            let d = f32x4::new([dest[idx], dest[idx + 1], dest[idx + 2], dest[idx + 3]]);
            let s = f32x4::new([src[idx], src[idx + 1], src[idx + 2], src[idx + 3]]);
            dest[idx..idx + 4].copy_from_slice(&(d + s * gain_vec).to_array());
        }

        for i in chunks * 4..len {
            dest[i] += src[i] * gain;
        }
    }

    /// Hard limit to [-1.0, 1.0].
    pub fn limit(&self, buffer: &mut [f32]) {
        let one = f32x4::splat(1.0);
        let neg_one = f32x4::splat(-1.0);
        let mut chunks = buffer.chunks_exact_mut(4);
        for chunk in &mut chunks {
            let v = f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]);
            chunk.copy_from_slice(&v.max(neg_one).min(one).to_array());
        }
        for sample in chunks.into_remainder() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}
