// src/decoder/mod.rs

pub mod dsp;
pub mod resample;

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::buffer::PcmBuffer;
use crate::error::{TimerError, TimerResult};

pub use resample::resample_to_rate;

fn decode_err(e: impl std::fmt::Display) -> TimerError {
    TimerError::Decode(e.to_string())
}

/// Decodes a complete in-memory audio file into planar f32 at its native rate.
///
/// `hint` is either a MIME type (`audio/mpeg`) or a file extension (`mp3`) and only
/// speeds up probing; decoding works without it.
pub fn decode(raw: &[u8], hint: Option<&str>) -> TimerResult<PcmBuffer> {
    let cursor = Cursor::new(raw.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut probe_hint = Hint::new();
    match hint {
        Some(h) if h.contains('/') => {
            probe_hint.mime_type(h);
        }
        Some(h) => {
            probe_hint.with_extension(h);
        }
        None => {}
    }

    let probed = get_probe()
        .format(
            &probe_hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_err)?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| TimerError::Decode("no default audio track".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut planar: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::ResetRequired) => break,
            Err(_) => break,
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::IoError(_)) => continue,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(decode_err(e)),
        };

        let spec = *decoded.spec();
        let decoded_ch = spec.channels.count();
        if decoded.frames() == 0 {
            continue;
        }
        // lock the layout on the first packet that carries audio
        if planar.is_empty() {
            planar = vec![Vec::new(); decoded_ch];
            sample_rate.get_or_insert(spec.rate);
        }

        let needed = decoded.capacity() * decoded_ch;
        if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        let samples = buf.samples();

        if decoded_ch == planar.len() {
            dsp::append_interleaved_to_planar(samples, &mut planar);
        } else {
            let mixed = dsp::updown_mix_interleaved(samples, decoded_ch, planar.len());
            dsp::append_interleaved_to_planar(&mixed, &mut planar);
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| TimerError::Decode("missing sample rate".into()))?;
    if dsp::planar_len(&planar) == 0 {
        return Err(TimerError::Decode("stream contains no audio frames".into()));
    }
    let buffer = PcmBuffer::from_planar(planar, sample_rate);
    log::debug!(
        "decoded {} frames, {} ch @ {} Hz",
        buffer.frames(),
        buffer.channel_count(),
        sample_rate
    );
    Ok(buffer)
}

/// `decode` followed by `resample_to_rate`.
pub fn decode_at_rate(raw: &[u8], hint: Option<&str>, target_rate: u32) -> TimerResult<PcmBuffer> {
    let native = decode(raw, hint)?;
    resample_to_rate(native, target_rate)
}

#[cfg(test)]
pub(crate) mod test_support {
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::io::Cursor;

    /// 16-bit PCM WAV bytes holding a constant `level` on every channel.
    pub fn wav_bytes(seconds: f64, sample_rate: u32, channels: u16, level: f32) -> Vec<u8> {
        ramp_wav_bytes(seconds, sample_rate, channels, |_| level)
    }

    /// WAV bytes whose sample at frame `i` is `f(i)` on every channel.
    pub fn ramp_wav_bytes(
        seconds: f64,
        sample_rate: u32,
        channels: u16,
        f: impl Fn(usize) -> f32,
    ) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * sample_rate as f64).round() as usize;
            for i in 0..frames {
                let s = (f(i).clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                for _ in 0..channels {
                    writer.write_sample(s).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::wav_bytes;
    use super::*;

    #[test]
    fn decodes_wav_bytes() {
        let bytes = wav_bytes(0.5, 8_000, 2, 0.25);
        let buf = decode(&bytes, Some("audio/wav")).unwrap();
        assert_eq!(buf.sample_rate, 8_000);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frames(), 4_000);
        assert!((buf.channel(1)[100] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode(b"definitely not audio", None).unwrap_err();
        assert!(matches!(err, TimerError::Decode(_)));
    }

    #[test]
    fn decode_at_rate_resamples_to_target() {
        let bytes = wav_bytes(1.0, 22_050, 1, 0.1);
        let buf = decode_at_rate(&bytes, Some("wav"), 44_100).unwrap();
        assert_eq!(buf.sample_rate, 44_100);
        assert_eq!(buf.frames(), 44_100);
        assert_eq!(buf.channel_count(), 1);
    }
}
