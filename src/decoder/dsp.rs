// src/decoder/dsp.rs

/// Splits interleaved frames onto the end of each planar lane.
pub fn append_interleaved_to_planar(interleaved: &[f32], planar: &mut [Vec<f32>]) {
    let channels = planar.len();
    if channels == 0 {
        return;
    }
    for frame in interleaved.chunks_exact(channels) {
        for (lane, &s) in planar.iter_mut().zip(frame) {
            lane.push(s);
        }
    }
}

/// Frames available in every lane.
pub fn planar_len(planar: &[Vec<f32>]) -> usize {
    planar.iter().map(Vec::len).min().unwrap_or(0)
}

/// Removes up to `frames` from the front of every lane and returns them.
pub fn take_from_planar(planar: &mut [Vec<f32>], frames: usize) -> Vec<Vec<f32>> {
    planar
        .iter_mut()
        .map(|lane| {
            let n = frames.min(lane.len());
            lane.drain(..n).collect()
        })
        .collect()
}

pub fn extend_planar(dst: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (d, b) in dst.iter_mut().zip(block) {
        d.extend(b);
    }
}

/// Remaps interleaved audio between channel counts.
///
/// Mono output averages every input lane. Otherwise each output lane copies
/// the input lane with the same index, wrapping when the input is narrower.
pub fn updown_mix_interleaved(input: &[f32], in_ch: usize, out_ch: usize) -> Vec<f32> {
    if in_ch == out_ch || in_ch == 0 || out_ch == 0 {
        return input.to_vec();
    }
    let frames = input.chunks_exact(in_ch);
    if out_ch == 1 {
        let scale = 1.0 / in_ch as f32;
        return frames.map(|f| f.iter().sum::<f32>() * scale).collect();
    }
    let mut out = Vec::with_capacity(frames.len() * out_ch);
    for frame in frames {
        out.extend((0..out_ch).map(|oc| frame[oc % in_ch]));
    }
    out
}

#[inline]
pub fn fade_samples_ms(sample_rate: u32, ms: u32) -> usize {
    (sample_rate as u64 * ms as u64 / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_to_mono_averages_lanes() {
        assert_eq!(updown_mix_interleaved(&[1.0, 0.0, 0.5, 0.5], 2, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn mono_is_copied_to_both_sides_and_surrounds_are_dropped() {
        assert_eq!(updown_mix_interleaved(&[0.1, 0.2], 1, 2), vec![0.1, 0.1, 0.2, 0.2]);
        let six = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(updown_mix_interleaved(&six, 6, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn take_from_planar_leaves_the_tail() {
        let mut planar = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let head = take_from_planar(&mut planar, 2);
        assert_eq!(head, vec![vec![1.0, 2.0], vec![4.0, 5.0]]);
        assert_eq!(planar_len(&planar), 1);
        assert_eq!(fade_samples_ms(48_000, 30), 1440);
    }

    #[test]
    fn interleaved_frames_land_in_lanes() {
        let mut planar = vec![Vec::new(), Vec::new()];
        append_interleaved_to_planar(&[1.0, -1.0, 2.0, -2.0], &mut planar);
        assert_eq!(planar, vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
    }
}
