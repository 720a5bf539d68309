// src/timeline.rs

use crate::buffer::{frames_for, PcmBuffer};
use crate::clip::Playlist;
use crate::error::{TimerError, TimerResult};

/// The run buffer is always stereo; mono songs fan out from channel 0.
pub const RUN_CHANNELS: usize = 2;

/// Concatenates the trimmed songs, in order, into a buffer of exactly
/// `target_secs * sample_rate` frames.
///
/// Songs that do not fit are truncated, later songs are never decoded once the
/// buffer is full, and a short playlist leaves silence at the end.
pub fn assemble(playlist: &mut Playlist, target_secs: f64, sample_rate: u32) -> TimerResult<PcmBuffer> {
    if playlist.is_empty() {
        return Err(TimerError::NoClips);
    }

    let capacity = frames_for(target_secs, sample_rate);
    let mut run = PcmBuffer::silent(RUN_CHANNELS, capacity, sample_rate);
    let mut offset = 0usize;

    for clip in playlist.iter_mut() {
        if offset >= capacity {
            break;
        }
        let (l, r) = clip.segment_frames(sample_rate);
        if r <= l {
            log::debug!("skipping '{}': empty trim range", clip.title);
            continue;
        }

        let decoded = clip.decoded(sample_rate)?;
        let r = r.min(decoded.frames());
        if r <= l {
            continue;
        }

        let copy = (r - l).min(capacity - offset);
        for ch in 0..RUN_CHANNELS {
            let src = &decoded.channel_or_first(ch)[l..l + copy];
            run.channel_mut(ch)[offset..offset + copy].copy_from_slice(src);
        }
        offset += copy;
        log::debug!("placed '{}' ({} frames) ending at frame {}", clip.title, copy, offset);
    }

    if offset < capacity {
        log::info!(
            "🧩 Run track filled {:.2}s of {:.2}s, rest is silence",
            offset as f64 / sample_rate as f64,
            target_secs
        );
    } else {
        log::info!("🧩 Run track filled to {:.2}s", target_secs);
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Clip;
    use crate::decoder::test_support::{ramp_wav_bytes, wav_bytes};
    use approx::assert_abs_diff_eq;

    const RATE: u32 = 1_000;

    fn add(p: &mut Playlist, bytes: Vec<u8>) -> crate::clip::ClipId {
        let id = p.allocate_id();
        let clip = Clip::load(id, "s.wav".into(), "audio/wav".into(), bytes, RATE).unwrap();
        p.push(clip);
        id
    }

    #[test]
    fn empty_playlist_is_reported() {
        let mut p = Playlist::new();
        assert!(matches!(assemble(&mut p, 10.0, RATE), Err(TimerError::NoClips)));
    }

    #[test]
    fn two_trimmed_clips_fill_exactly_eight_seconds() {
        let mut p = Playlist::new();
        let a = add(&mut p, wav_bytes(10.0, RATE, 2, 0.2));
        let b = add(&mut p, ramp_wav_bytes(10.0, RATE, 1, |i| i as f32 / 10_000.0));
        p.get_mut(a).unwrap().set_trim(2.5, 7.5);
        p.get_mut(b).unwrap().set_trim(2.5, 7.5);

        let run = assemble(&mut p, 8.0, RATE).unwrap();
        assert_eq!(run.frames(), 8_000);
        assert_eq!(run.channel_count(), 2);

        assert_abs_diff_eq!(run.channel(0)[0], 0.2, epsilon = 1e-3);
        assert_abs_diff_eq!(run.channel(1)[4_999], 0.2, epsilon = 1e-3);
        // clip b starts at its left handle and is mono fanned out to both channels
        assert_abs_diff_eq!(run.channel(0)[5_000], 0.25, epsilon = 1e-3);
        assert_abs_diff_eq!(run.channel(1)[5_000], 0.25, epsilon = 1e-3);
        assert_abs_diff_eq!(run.channel(0)[7_999], 0.5499, epsilon = 1e-3);
    }

    #[test]
    fn short_playlist_is_padded_with_silence() {
        let mut p = Playlist::new();
        let a = add(&mut p, wav_bytes(3.0, RATE, 1, 0.5));
        p.get_mut(a).unwrap().set_trim(0.0, 2.0);
        let run = assemble(&mut p, 5.0, RATE).unwrap();
        assert_eq!(run.frames(), 5_000);
        assert_abs_diff_eq!(run.channel(0)[1_999], 0.5, epsilon = 1e-3);
        assert!(run.channel(0)[2_000..].iter().all(|&s| s == 0.0));
        assert!(run.channel(1)[2_000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn never_exceeds_target_length() {
        let mut p = Playlist::new();
        for _ in 0..4 {
            add(&mut p, wav_bytes(4.0, RATE, 2, 0.1));
        }
        let run = assemble(&mut p, 6.5, RATE).unwrap();
        assert_eq!(run.frames(), 6_500);
    }
}
