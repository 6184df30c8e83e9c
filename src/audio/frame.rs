//! Audio frame type shared between capture, playback and the session pump
//!
//! Frames carry raw interleaved S16LE samples, the same representation that
//! goes over the relay socket. Conversion to and from f32 happens only at
//! the device callback boundary.

use bytes::Bytes;

/// A fixed-size buffer of raw interleaved S16LE samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
}

impl AudioFrame {
    /// Wrap raw S16LE bytes as a frame
    pub fn from_bytes(data: Bytes) -> Self {
        Self { data }
    }

    /// Build a frame from f32 samples, clamping to [-1.0, 1.0]
    pub fn from_f32_samples(samples: &[f32]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let value = (clamped * i16::MAX as f32) as i16;
            data.extend_from_slice(&value.to_le_bytes());
        }
        Self { data: data.into() }
    }

    /// Decode the frame into f32 samples in [-1.0, 1.0]
    pub fn to_f32_samples(&self) -> Vec<f32> {
        self.data
            .chunks_exact(2)
            .map(|pair| {
                let value = i16::from_le_bytes([pair[0], pair[1]]);
                value as f32 / i16::MAX as f32
            })
            .collect()
    }

    /// Raw S16LE payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame carries no samples
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of samples in the frame (across all channels)
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_round_trip() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let frame = AudioFrame::from_f32_samples(&samples);

        assert_eq!(frame.len(), 10);
        assert_eq!(frame.sample_count(), 5);

        let restored = frame.to_f32_samples();
        for (orig, back) in samples.iter().zip(restored.iter()) {
            assert!((orig - back).abs() < 1e-3, "{} vs {}", orig, back);
        }
    }

    #[test]
    fn test_out_of_range_samples_clamp() {
        let frame = AudioFrame::from_f32_samples(&[2.0, -2.0]);
        let restored = frame.to_f32_samples();

        assert!((restored[0] - 1.0).abs() < 1e-3);
        assert!((restored[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_raw_bytes_preserved() {
        let payload = Bytes::from_static(&[1, 2, 3, 4]);
        let frame = AudioFrame::from_bytes(payload.clone());

        assert_eq!(frame.as_bytes(), payload.as_ref());
        assert_eq!(frame.sample_count(), 2);
    }
}
