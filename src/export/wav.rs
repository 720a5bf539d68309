// src/export/wav.rs

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::buffer::PcmBuffer;
use crate::error::TimerResult;

/// `round(sample * 32767)` after clamping to [-1, 1].
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Canonical 16-bit PCM WAV: RIFF header, 16 byte `fmt ` chunk, interleaved `data`.
pub fn encode_wav(buffer: &PcmBuffer) -> TimerResult<Vec<u8>> {
    let channels = buffer.channel_count();
    let spec = WavSpec {
        channels: channels as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.frames() * channels * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for f in 0..buffer.frames() {
            for ch in 0..channels {
                writer.write_sample(to_i16(buffer.channel(ch)[f]))?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn header_sizes_match_payload() {
        let n = 1_000;
        let buf = PcmBuffer::silent(2, n, 44_100);
        let bytes = encode_wav(&buf).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");
        let data_size = u32_at(&bytes, 40);
        assert_eq!(data_size as usize, n * 2 * 2);
        assert_eq!(u32_at(&bytes, 4), 36 + data_size);
        assert_eq!(u32_at(&bytes, 24), 44_100);
        assert_eq!(bytes.len(), 44 + n * 4);
    }

    #[test]
    fn samples_are_clamped_and_scaled() {
        assert_eq!(to_i16(1.5), 32_767);
        assert_eq!(to_i16(-2.0), -32_767);
        assert_eq!(to_i16(0.5), 16_384);
        assert_eq!(to_i16(0.0), 0);

        let buf = PcmBuffer::from_planar(vec![vec![0.5, -1.0], vec![2.0, 0.0]], 8_000);
        let bytes = encode_wav(&buf).unwrap();
        let samples: Vec<i16> = bytes[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![16_384, 32_767, -32_767, 0]);
    }
}
