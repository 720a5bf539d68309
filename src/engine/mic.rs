// src/engine/mic.rs

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::{TimerError, TimerResult};

/// Mono capacity of the mic feed. Two seconds at 96 kHz.
pub const MIC_RING_CAPACITY: usize = 192_000;

/// A live microphone: mono samples at the graph rate, plus whatever keeps the
/// device running. Dropping the feed releases the device.
pub struct MicFeed {
    pub consumer: HeapCons<f32>,
    pub keep_alive: Option<Stream>,
}

/// Privileged audio-input capability. `open` is called once, on the first coach
/// activation of a mode; the feed is then held for the rest of the session.
pub trait MicSource {
    fn open(&mut self, sample_rate: u32) -> TimerResult<MicFeed>;
}

/// Default input device through cpal.
#[derive(Default)]
pub struct CpalMic;

impl MicSource for CpalMic {
    fn open(&mut self, sample_rate: u32) -> TimerResult<MicFeed> {
        let (producer, consumer) = HeapRb::<f32>::new(MIC_RING_CAPACITY).split();
        let stream = build_input(producer, sample_rate)
            .map_err(|e| TimerError::MicUnavailable(e.to_string()))?;
        Ok(MicFeed {
            consumer,
            keep_alive: Some(stream),
        })
    }
}

/// Stands in when no microphone should be touched (`--no-mic`).
#[derive(Default)]
pub struct NoMic;

impl MicSource for NoMic {
    fn open(&mut self, _sample_rate: u32) -> TimerResult<MicFeed> {
        Err(TimerError::MicUnavailable("microphone disabled".into()))
    }
}

fn build_input(producer: HeapProd<f32>, target_rate: u32) -> anyhow::Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

    let supported_config = device.default_input_config()?;
    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let channels = config.channels as usize;
    let input_rate = config.sample_rate.0;

    log::info!(
        "🎙️ Mic: {} channel(s) at {} Hz, feeding graph at {} Hz",
        channels,
        input_rate,
        target_rate
    );

    let mut feed = MonoFeed::new(producer, channels, input_rate, target_rate);
    let err_fn = |err| log::error!("Mic stream error: {err}");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| feed.push(data, |s| s),
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| feed.push(data, |s| s as f32 / i16::MAX as f32),
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _| feed.push(data, |s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0),
            err_fn,
            None,
        )?,
        other => anyhow::bail!("Unsupported sample format: {:?}", other),
    };

    stream.play()?;
    Ok(stream)
}

/// Downmixes device frames to mono and holds/drops samples to match the graph
/// rate. Crude, but a talking voice does not need more.
struct MonoFeed {
    producer: HeapProd<f32>,
    channels: usize,
    step: f64,
    acc: f64,
}

impl MonoFeed {
    fn new(producer: HeapProd<f32>, channels: usize, input_rate: u32, target_rate: u32) -> Self {
        Self {
            producer,
            channels: channels.max(1),
            step: target_rate as f64 / input_rate.max(1) as f64,
            acc: 0.0,
        }
    }

    /// Averages each device frame to mono while converting, so the callback
    /// never allocates.
    fn push<T: Copy>(&mut self, interleaved: &[T], to_f32: impl Fn(T) -> f32) {
        let scale = 1.0 / self.channels as f32;
        for frame in interleaved.chunks_exact(self.channels) {
            let s = frame.iter().map(|&v| to_f32(v)).sum::<f32>() * scale;
            self.acc += self.step;
            while self.acc >= 1.0 {
                // full ring: drop, the render side keeps its backlog short anyway
                let _ = self.producer.try_push(s);
                self.acc -= 1.0;
            }
        }
    }
}
