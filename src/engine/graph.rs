// src/engine/graph.rs

use std::sync::{Arc, Mutex};

use ringbuf::traits::{Consumer, Observer};
use ringbuf::HeapCons;

use crate::buffer::PcmBuffer;
use crate::config::{EngineConfig, MicRouting};
use crate::effects::compressor::CompressorNode;
use crate::engine::mic::{MicFeed, MicSource};
use crate::error::TimerResult;

/// Mic samples allowed to pile up before the render side skips ahead.
const MIC_MAX_BACKLOG: usize = 2_048;

/// Gain automation: holds `from` until `start`, then ramps linearly to `to` over
/// `len` frames. Evaluated per frame, so a ramp can be placed at any future frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainParam {
    from: f32,
    to: f32,
    start: u64,
    len: u64,
}

impl GainParam {
    pub fn new(value: f32) -> Self {
        Self {
            from: value,
            to: value,
            start: 0,
            len: 0,
        }
    }

    pub fn value_at(&self, frame: u64) -> f32 {
        if frame <= self.start {
            return self.from;
        }
        let elapsed = frame - self.start;
        if elapsed >= self.len {
            return self.to;
        }
        self.from + (self.to - self.from) * (elapsed as f32 / self.len as f32)
    }

    /// Starts a ramp at `at` from whatever value the param has at that frame.
    pub fn ramp_to(&mut self, at: u64, target: f32, len: u64) {
        let from = self.value_at(at);
        *self = Self {
            from,
            to: target,
            start: at,
            len,
        };
    }

    pub fn target(&self) -> f32 {
        self.to
    }
}

/// One buffer playing from `offset` at `start_frame`.
struct Voice {
    buffer: Arc<PcmBuffer>,
    start_frame: u64,
    offset: usize,
}

impl Voice {
    #[inline]
    fn sample(&self, ch: usize, frame: u64) -> Option<f32> {
        if frame < self.start_frame {
            return Some(0.0);
        }
        let idx = self.offset + (frame - self.start_frame) as usize;
        (idx < self.buffer.frames()).then(|| self.buffer.sample(ch, idx))
    }

    fn finished_by(&self, frame: u64) -> bool {
        frame >= self.start_frame
            && self.offset + (frame - self.start_frame) as usize >= self.buffer.frames()
    }
}

/// Render-side state of one mode's graph.
///
/// ```text
/// run ──┬─ gainLeft ──┐
///       └─ gainRight ─┴─ merge ── out (+ intro, beeps, clamp)
/// mic ── micGain ── compressor ── right | both
/// ```
pub struct GraphState {
    run: Option<Voice>,
    intro: Option<Voice>,
    intro_gain: GainParam,
    beep: Arc<PcmBuffer>,
    beeps: Vec<Voice>,
    gain_left: GainParam,
    gain_right: GainParam,
    mic_gain: GainParam,
    mic: Option<HeapCons<f32>>,
    compressor: CompressorNode,
    routing: MicRouting,
    mic_scratch: Vec<f32>,
}

impl GraphState {
    fn new(config: &EngineConfig, beep: Arc<PcmBuffer>) -> Self {
        Self {
            run: None,
            intro: None,
            intro_gain: GainParam::new(1.0),
            beep,
            beeps: Vec::new(),
            gain_left: GainParam::new(1.0),
            gain_right: GainParam::new(1.0),
            mic_gain: GainParam::new(0.0),
            mic: None,
            compressor: CompressorNode::new(config.sample_rate as f32, config.mic_compressor),
            routing: config.mic_routing,
            mic_scratch: Vec::with_capacity(4_096),
        }
    }

    /// Renders `out.len() / channels` frames starting at absolute frame
    /// `block_start`, adding into `out`. Channels past the second stay untouched.
    pub fn render_add(&mut self, out: &mut [f32], channels: usize, block_start: u64) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        // mic is always drained so no stale audio is waiting when the coach keys in
        if self.mic_scratch.len() < frames {
            self.mic_scratch.resize(frames, 0.0);
        }
        let mic = &mut self.mic_scratch[..frames];
        mic.fill(0.0);
        if let Some(cons) = self.mic.as_mut() {
            let backlog = cons.occupied_len();
            if backlog > MIC_MAX_BACKLOG + frames {
                cons.skip(backlog - MIC_MAX_BACKLOG - frames);
            }
            cons.pop_slice(mic);
            self.compressor.process(mic);
        }

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let abs = block_start + i as u64;

            let (mut l, mut r) = (0.0f32, 0.0f32);
            if let Some(run) = &self.run {
                l = run.sample(0, abs).unwrap_or(0.0);
                r = run.sample(1, abs).unwrap_or(0.0);
            }
            l *= self.gain_left.value_at(abs);
            r *= self.gain_right.value_at(abs);

            if let Some(intro) = &self.intro {
                let g = self.intro_gain.value_at(abs);
                l += intro.sample(0, abs).unwrap_or(0.0) * g;
                r += intro.sample(1, abs).unwrap_or(0.0) * g;
            }

            for voice in &self.beeps {
                l += voice.sample(0, abs).unwrap_or(0.0);
                r += voice.sample(1, abs).unwrap_or(0.0);
            }

            let m = mic[i] * self.mic_gain.value_at(abs);
            match self.routing {
                MicRouting::RightOnly => r += m,
                MicRouting::Both => {
                    l += m;
                    r += m;
                }
            }

            frame[0] = (frame[0] + l).clamp(-1.0, 1.0);
            if frame.len() >= 2 {
                frame[1] = (frame[1] + r).clamp(-1.0, 1.0);
            }
        }

        let end = block_start + frames as u64;
        self.beeps.retain(|v| !v.finished_by(end));
    }
}

pub type SharedGraph = Arc<Mutex<GraphState>>;

/// Control side of one mode's live graph. Every method takes the lock once, so
/// each change is atomic with respect to the render callback.
pub struct MixingGraph {
    state: SharedGraph,
    mic_source: Box<dyn MicSource>,
    mic_acquired: bool,
    _mic_stream: Option<cpal::Stream>,
    coach_active: bool,
    sample_rate: u32,
    duck_amount: f32,
    ramp_frames: u64,
}

impl MixingGraph {
    pub fn new(config: &EngineConfig, beep: Arc<PcmBuffer>, mic_source: Box<dyn MicSource>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GraphState::new(config, beep))),
            mic_source,
            mic_acquired: false,
            _mic_stream: None,
            coach_active: false,
            sample_rate: config.sample_rate,
            duck_amount: config.duck_amount,
            ramp_frames: config.duck_ramp_ms as u64 * config.sample_rate as u64 / 1_000,
        }
    }

    /// Handle for the output stream.
    pub fn shared(&self) -> SharedGraph {
        self.state.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn ramp_frames(&self) -> u64 {
        self.ramp_frames
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut GraphState) -> R) -> Option<R> {
        match self.state.lock() {
            Ok(mut g) => Some(f(&mut g)),
            Err(_) => {
                log::error!("mixing graph lock poisoned");
                None
            }
        }
    }

    pub fn set_beep(&self, beep: Arc<PcmBuffer>) {
        self.with_state(|g| g.beep = beep);
    }

    pub fn start_run(&self, buffer: Arc<PcmBuffer>, at_frame: u64, offset: usize) {
        self.with_state(|g| {
            g.run = Some(Voice {
                buffer,
                start_frame: at_frame,
                offset,
            })
        });
    }

    /// Silences the run and drops every beep not yet finished.
    pub fn stop_run(&self) {
        self.with_state(|g| {
            g.run = None;
            g.beeps.clear();
        });
    }

    /// Releases the finished run. Beeps already started keep ringing, so a beep
    /// on the last frame of the run is still heard.
    pub fn end_run(&self) {
        self.with_state(|g| g.run = None);
    }

    pub fn play_intro(&self, buffer: Arc<PcmBuffer>, at_frame: u64) {
        self.with_state(|g| {
            g.intro_gain = GainParam::new(1.0);
            g.intro = Some(Voice {
                buffer,
                start_frame: at_frame,
                offset: 0,
            });
        });
    }

    pub fn duck_intro(&self, at_frame: u64, gain: f32) {
        let len = self.ramp_frames;
        self.with_state(|g| g.intro_gain.ramp_to(at_frame, gain, len));
    }

    pub fn stop_intro(&self) {
        self.with_state(|g| g.intro = None);
    }

    pub fn trigger_beep(&self, at_frame: u64) {
        self.with_state(|g| {
            let buffer = g.beep.clone();
            g.beeps.push(Voice {
                buffer,
                start_frame: at_frame,
                offset: 0,
            });
        });
    }

    /// Ramps `gainLeft` to `value` from `at_frame`.
    pub fn set_gain_left(&self, at_frame: u64, value: f32) {
        let len = self.ramp_frames;
        self.with_state(|g| g.gain_left.ramp_to(at_frame, value, len));
    }

    /// Ramps `gainRight` to `value` from `at_frame`. The coach duck overrides it
    /// while active and restores 1.0 when released.
    pub fn set_gain_right(&self, at_frame: u64, value: f32) {
        let len = self.ramp_frames;
        self.with_state(|g| g.gain_right.ramp_to(at_frame, value, len));
    }

    pub fn is_coach_active(&self) -> bool {
        self.coach_active
    }

    /// Ducks the right channel and opens the mic. The mic is acquired on first
    /// use; if that fails nothing in the graph changes.
    pub fn coach_on(&mut self, at_frame: u64) -> TimerResult<()> {
        if self.coach_active {
            return Ok(());
        }
        if !self.mic_acquired {
            let MicFeed { consumer, keep_alive } = self.mic_source.open(self.sample_rate)?;
            self.with_state(|g| g.mic = Some(consumer));
            self._mic_stream = keep_alive;
            self.mic_acquired = true;
            log::info!("🎙️ Coach mic acquired");
        }
        let (duck, len) = (self.duck_amount, self.ramp_frames);
        self.with_state(|g| {
            g.compressor.reset();
            g.gain_right.ramp_to(at_frame, duck, len);
            g.mic_gain.ramp_to(at_frame, 1.0, len);
        });
        self.coach_active = true;
        log::debug!("coach on at frame {at_frame}");
        Ok(())
    }

    pub fn coach_off(&mut self, at_frame: u64) {
        if !self.coach_active {
            return;
        }
        let len = self.ramp_frames;
        self.with_state(|g| {
            g.gain_right.ramp_to(at_frame, 1.0, len);
            g.mic_gain.ramp_to(at_frame, 0.0, len);
        });
        self.coach_active = false;
        log::debug!("coach off at frame {at_frame}");
    }

    /// Target values of (gainLeft, gainRight, micGain).
    pub fn gain_targets(&self) -> (f32, f32, f32) {
        self.with_state(|g| (g.gain_left.target(), g.gain_right.target(), g.mic_gain.target()))
            .unwrap_or((1.0, 1.0, 0.0))
    }

    /// Renders one block straight from the control side (tests, offline drivers).
    pub fn render(&self, out: &mut [f32], channels: usize, block_start: u64) {
        out.fill(0.0);
        self.with_state(|g| g.render_add(out, channels, block_start));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mic::test_support::FakeMic;
    use crate::engine::mic::NoMic;
    use crate::error::TimerError;
    use approx::assert_abs_diff_eq;
    use ringbuf::traits::Producer;

    const RATE: u32 = 1_000;

    fn config() -> EngineConfig {
        let mut cfg = EngineConfig {
            sample_rate: RATE,
            duck_ramp_ms: 10,
            ..EngineConfig::default()
        };
        cfg.mic_compressor.is_active = false;
        cfg
    }

    fn dc(level: f32, frames: usize) -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::from_planar(vec![vec![level; frames]; 2], RATE))
    }

    fn beep() -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::from_planar(vec![vec![0.25; 5]], RATE))
    }

    fn render(graph: &MixingGraph, start: u64, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        graph.render(&mut out, 2, start);
        out
    }

    #[test]
    fn gain_param_ramps_linearly_from_current_value() {
        let mut p = GainParam::new(1.0);
        p.ramp_to(100, 0.5, 10);
        assert_eq!(p.value_at(50), 1.0);
        assert_abs_diff_eq!(p.value_at(105), 0.75, epsilon = 1e-6);
        assert_eq!(p.value_at(200), 0.5);
        p.ramp_to(105, 1.0, 0);
        assert_eq!(p.value_at(105), 0.75);
        assert_eq!(p.value_at(106), 1.0);
    }

    #[test]
    fn run_starts_on_its_frame_with_offset() {
        let graph = MixingGraph::new(&config(), beep(), Box::new(NoMic));
        let run = Arc::new(PcmBuffer::from_planar(
            vec![(0..100).map(|i| i as f32 / 100.0).collect(); 2],
            RATE,
        ));
        graph.start_run(run, 4, 10);
        let out = render(&graph, 0, 8);
        assert_eq!(out[6], 0.0);
        assert_abs_diff_eq!(out[8], 0.10, epsilon = 1e-6);
        assert_abs_diff_eq!(out[15], 0.13, epsilon = 1e-6);
    }

    #[test]
    fn beeps_mix_into_both_channels_and_clamp() {
        let graph = MixingGraph::new(&config(), beep(), Box::new(NoMic));
        graph.start_run(dc(0.9, 100), 0, 0);
        graph.trigger_beep(2);
        let out = render(&graph, 0, 10);
        assert_abs_diff_eq!(out[0], 0.9, epsilon = 1e-6);
        assert_eq!(out[4], 1.0);
        assert_eq!(out[5], 1.0);
        assert_abs_diff_eq!(out[14], 0.9, epsilon = 1e-6);
    }

    #[test]
    fn stopping_the_run_drops_pending_beeps() {
        let graph = MixingGraph::new(&config(), beep(), Box::new(NoMic));
        graph.start_run(dc(0.1, 100), 0, 0);
        graph.trigger_beep(50);
        graph.stop_run();
        assert!(render(&graph, 40, 30).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn failed_mic_leaves_gains_untouched() {
        let mut graph = MixingGraph::new(&config(), beep(), Box::new(NoMic));
        let err = graph.coach_on(0).unwrap_err();
        assert!(matches!(err, TimerError::MicUnavailable(_)));
        assert!(!graph.is_coach_active());
        assert_eq!(graph.gain_targets(), (1.0, 1.0, 0.0));
    }

    #[test]
    fn coach_ducks_right_channel_and_routes_voice_right() {
        let mic = FakeMic::default();
        let producer = mic.producer.clone();
        let opens = mic.opens.clone();
        let mut graph = MixingGraph::new(&config(), beep(), Box::new(mic));
        graph.start_run(dc(0.4, 1_000), 0, 0);

        graph.coach_on(0).unwrap();
        assert_eq!(graph.gain_targets(), (1.0, 0.5, 1.0));
        producer.lock().unwrap().as_mut().unwrap().push_slice(&[0.1; 64]);

        let out = render(&graph, 20, 32);
        // past the 10 frame ramp: left untouched, right = 0.4 * 0.5 + mic
        assert_abs_diff_eq!(out[0], 0.4, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 0.3, epsilon = 1e-6);

        graph.coach_off(52);
        graph.coach_on(100).unwrap();
        assert_eq!(*opens.lock().unwrap(), 1);
        graph.coach_off(100);
        let out = render(&graph, 200, 4);
        assert_abs_diff_eq!(out[1], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn left_and_right_gains_scale_independently() {
        let graph = MixingGraph::new(&config(), beep(), Box::new(NoMic));
        graph.start_run(dc(0.8, 1_000), 0, 0);
        graph.set_gain_left(0, 0.25);
        graph.set_gain_right(0, 0.5);
        assert_eq!(graph.gain_targets(), (0.25, 0.5, 0.0));

        let out = render(&graph, 0, 20);
        // mid ramp on frame 5, settled by frame 10
        assert_abs_diff_eq!(out[10], 0.8 * 0.625, epsilon = 1e-6);
        assert_abs_diff_eq!(out[11], 0.8 * 0.75, epsilon = 1e-6);
        assert_abs_diff_eq!(out[30], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(out[31], 0.4, epsilon = 1e-6);

        graph.set_gain_left(100, 1.0);
        let out = render(&graph, 200, 2);
        assert_abs_diff_eq!(out[0], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn coach_with_both_routing_feeds_voice_to_both_sides() {
        let mut cfg = config();
        cfg.mic_routing = MicRouting::Both;
        let mic = FakeMic::default();
        let producer = mic.producer.clone();
        let mut graph = MixingGraph::new(&cfg, beep(), Box::new(mic));
        graph.start_run(dc(0.4, 1_000), 0, 0);

        graph.coach_on(0).unwrap();
        producer.lock().unwrap().as_mut().unwrap().push_slice(&[0.1; 64]);

        let out = render(&graph, 20, 32);
        // left keeps full music, only the right side is ducked
        assert_abs_diff_eq!(out[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn ended_run_lets_started_beeps_ring_out() {
        let graph = MixingGraph::new(&config(), beep(), Box::new(NoMic));
        graph.start_run(dc(0.1, 100), 0, 0);
        graph.trigger_beep(100);
        graph.end_run();
        let out = render(&graph, 100, 4);
        assert_abs_diff_eq!(out[0], 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn intro_duck_ramps_to_target_gain() {
        let graph = MixingGraph::new(&config(), beep(), Box::new(NoMic));
        graph.play_intro(dc(0.8, 100), 0);
        graph.duck_intro(50, 0.75);
        let out = render(&graph, 0, 100);
        assert_abs_diff_eq!(out[2 * 40], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(out[2 * 70], 0.6, epsilon = 1e-6);
    }
}
