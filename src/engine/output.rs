// src/engine/output.rs

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};

use super::clock::SampleClock;
use super::graph::SharedGraph;

/// Default output device and the config the graphs will run at.
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and its config.
pub fn setup_output_device() -> anyhow::Result<OutputConfig> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("No output device available"))?;
    let supported_config = device.default_output_config()?;
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::info!(
        "🔊 Output device: channels: {}, sample_rate: {}",
        output_channels,
        output_sample_rate
    );

    Ok(OutputConfig {
        device,
        config,
        output_channels,
        output_sample_rate,
    })
}

/// Graphs the output callback renders, summed. Every attached graph is rendered
/// on every block so all of them stay in step with the shared clock.
#[derive(Clone, Default)]
pub struct GraphBus {
    graphs: Arc<Mutex<Vec<SharedGraph>>>,
}

impl GraphBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, graph: SharedGraph) {
        if let Ok(mut graphs) = self.graphs.lock() {
            graphs.push(graph);
        }
    }

    /// Renders one block of interleaved `channels`-wide audio starting at `block_start`.
    pub fn render(&self, out: &mut [f32], channels: usize, block_start: u64) {
        out.fill(0.0);
        let Ok(graphs) = self.graphs.lock() else {
            return;
        };
        for graph in graphs.iter() {
            if let Ok(mut g) = graph.lock() {
                g.render_add(out, channels, block_start);
            }
        }
    }
}

/// Live output: owns the cpal stream, which renders the bus and advances the clock.
pub struct AudioOutput {
    pub clock: SampleClock,
    pub channels: usize,
    _stream: Stream,
}

impl AudioOutput {
    pub fn start(output: OutputConfig, bus: GraphBus) -> anyhow::Result<Self> {
        let OutputConfig {
            device,
            config,
            output_channels,
            output_sample_rate,
        } = output;

        let clock = SampleClock::new(output_sample_rate);
        let clock_cb = clock.clone();
        let err_fn = |err| log::error!("Output stream error: {err}");

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / output_channels.max(1);
                bus.render(data, output_channels, clock_cb.frames());
                clock_cb.advance(frames as u64);
            },
            err_fn,
            None,
        )?;
        stream.play()?;

        Ok(Self {
            clock,
            channels: output_channels,
            _stream: stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PcmBuffer;
    use crate::config::EngineConfig;
    use crate::engine::graph::MixingGraph;
    use crate::engine::mic::NoMic;

    #[test]
    fn bus_sums_graphs_and_leaves_extra_channels_silent() {
        let cfg = EngineConfig {
            sample_rate: 100,
            ..EngineConfig::default()
        };
        let beep = Arc::new(PcmBuffer::silent(1, 1, 100));
        let run = Arc::new(PcmBuffer::from_planar(vec![vec![0.25; 10]; 2], 100));

        let a = MixingGraph::new(&cfg, beep.clone(), Box::new(NoMic));
        let b = MixingGraph::new(&cfg, beep, Box::new(NoMic));
        a.start_run(run.clone(), 0, 0);
        b.start_run(run, 0, 0);

        let bus = GraphBus::new();
        bus.attach(a.shared());
        bus.attach(b.shared());

        let mut out = vec![1.0f32; 4 * 3];
        bus.render(&mut out, 4, 0);
        assert_eq!(&out[..4], &[0.5, 0.5, 0.0, 0.0]);
    }
}
