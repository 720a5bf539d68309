// src/buffer.rs

/// Planar f32 audio: one `Vec` per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

/// Converts seconds to a whole frame count at `sample_rate`.
#[inline]
pub fn frames_for(seconds: f64, sample_rate: u32) -> usize {
    (seconds.max(0.0) * sample_rate as f64).round() as usize
}

impl PcmBuffer {
    /// Zero-filled buffer.
    pub fn silent(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels.max(1)],
        }
    }

    /// Builds from planar data. Shorter channels are zero-padded to the longest one.
    pub fn from_planar(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        if channels.is_empty() {
            channels.push(Vec::new());
        }
        let frames = channels.iter().map(|c| c.len()).max().unwrap_or(0);
        for ch in &mut channels {
            ch.resize(frames, 0.0);
        }
        Self { sample_rate, channels }
    }

    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = interleaved.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &s) in frame.iter().enumerate() {
                planar[ch].push(s);
            }
        }
        Self { sample_rate, channels: planar }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.channels[ch]
    }

    /// Channel `ch`, or channel 0 when the buffer has fewer channels (mono fan-out).
    pub fn channel_or_first(&self, ch: usize) -> &[f32] {
        self.channels.get(ch).unwrap_or(&self.channels[0])
    }

    pub fn planar(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_planar(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Copies frames `[start, end)` into a new buffer; bounds are clamped.
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.frames());
        let start = start.min(end);
        Self {
            sample_rate: self.sample_rate,
            channels: self.channels.iter().map(|c| c[start..end].to_vec()).collect(),
        }
    }

    /// Sample at `frame` for output channel `ch` (mono sources fan out), 0.0 past the end.
    #[inline]
    pub fn sample(&self, ch: usize, frame: usize) -> f32 {
        self.channel_or_first(ch).get(frame).copied().unwrap_or(0.0)
    }

    pub fn interleaved(&self) -> Vec<f32> {
        let channels = self.channel_count();
        let frames = self.frames();
        let mut out = vec![0.0f32; frames * channels];
        for (ch, data) in self.channels.iter().enumerate() {
            for (f, &s) in data.iter().enumerate() {
                out[f * channels + ch] = s;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_source_fans_out_to_right_channel() {
        let buf = PcmBuffer::from_planar(vec![vec![0.1, 0.2, 0.3]], 8);
        assert_eq!(buf.channel_or_first(1), &[0.1, 0.2, 0.3]);
        assert_eq!(buf.sample(1, 2), 0.3);
        assert_eq!(buf.sample(0, 10), 0.0);
    }

    #[test]
    fn interleaving_preserves_frame_order() {
        let buf = PcmBuffer::from_interleaved(&[1.0, -1.0, 2.0, -2.0], 2, 4);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(1), &[-1.0, -2.0]);
        assert_eq!(buf.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn slice_clamps_to_buffer_end() {
        let buf = PcmBuffer::from_planar(vec![(0..10).map(|i| i as f32).collect()], 10);
        let s = buf.slice_frames(8, 20);
        assert_eq!(s.channel(0), &[8.0, 9.0]);
        assert_eq!(frames_for(1.5, 10), 15);
    }
}
