// src/playback.rs

use std::sync::Arc;

use crate::beeps::BeepPlan;
use crate::buffer::{frames_for, PcmBuffer};
use crate::config::EngineConfig;
use crate::engine::{frame_at, AudioClock, MixingGraph, TimerQueue, TimerSet};
use crate::error::{TimerError, TimerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    PlayingIntro,
    /// Starter beeps over the silent pre-roll (no intro).
    CountingIn,
    Running,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepKind {
    Starter,
    Timing,
}

/// A beep handed to the graph, with the clock time it sounds at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiredBeep {
    pub kind: BeepKind,
    pub at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    StarterBeep,
    IntroDuck,
    RunStart,
    TimingBeep,
}

/// What a started session plays.
struct Program {
    run: Arc<PcmBuffer>,
    plan: BeepPlan,
}

/// Live session state machine. Owns the mode's mixing graph and every deferred
/// event; `tick()` must be called regularly (UI frame rate is plenty).
pub struct PlaybackController {
    graph: MixingGraph,
    clock: Arc<dyn AudioClock>,
    sample_rate: u32,
    schedule_ahead: f64,
    intro_duck_gain: f32,

    state: PlaybackState,
    program: Option<Program>,
    timers: TimerQueue<Event>,
    intro_timers: TimerSet,
    beep_timers: TimerSet,

    anchor_time: f64,
    offset_at_anchor: f64,
    run_offset: f64,
    fired: Vec<FiredBeep>,
}

impl PlaybackController {
    pub fn new(config: &EngineConfig, graph: MixingGraph, clock: Arc<dyn AudioClock>) -> Self {
        Self {
            graph,
            clock,
            sample_rate: config.sample_rate,
            schedule_ahead: config.schedule_ahead_secs.max(0.0),
            intro_duck_gain: config.intro_duck_gain,
            state: PlaybackState::Idle,
            program: None,
            timers: TimerQueue::new(),
            intro_timers: TimerSet::new(),
            beep_timers: TimerSet::new(),
            anchor_time: 0.0,
            offset_at_anchor: 0.0,
            run_offset: 0.0,
            fired: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn graph(&self) -> &MixingGraph {
        &self.graph
    }

    /// Beeps dispatched since the last `start()`.
    pub fn fired_beeps(&self) -> &[FiredBeep] {
        &self.fired
    }

    /// Last recorded run position (`runOffsetSeconds`).
    pub fn run_offset(&self) -> f64 {
        self.run_offset
    }

    pub fn run_duration(&self) -> f64 {
        self.program
            .as_ref()
            .map(|p| p.run.duration_secs())
            .unwrap_or(0.0)
    }

    /// Current run position in seconds, from the clock and the last anchor.
    pub fn position(&self) -> f64 {
        match self.state {
            PlaybackState::Running => {
                let elapsed = (self.clock.now() - self.anchor_time).max(0.0);
                (self.offset_at_anchor + elapsed).min(self.run_duration())
            }
            PlaybackState::Paused | PlaybackState::Ended => self.run_offset,
            _ => 0.0,
        }
    }

    fn frame(&self, t: f64) -> u64 {
        frame_at(t, self.sample_rate)
    }

    /// Starts a session: intro (or count-in) then the run.
    pub fn start(
        &mut self,
        run: Option<Arc<PcmBuffer>>,
        intro: Option<Arc<PcmBuffer>>,
        plan: BeepPlan,
    ) -> TimerResult<()> {
        let run = run.ok_or(TimerError::NotBuilt)?;
        self.release_coach();
        if self.state != PlaybackState::Idle {
            self.stop();
        }
        self.fired.clear();
        self.run_offset = 0.0;

        let t0 = self.clock.now();
        let has_intro = intro.is_some();
        if let Some(intro) = intro {
            self.graph.play_intro(intro, self.frame(t0));
        }
        for s in &plan.starter {
            self.timers
                .schedule_in(&mut self.intro_timers, t0 + s, Event::StarterBeep);
        }
        if let Some(duck_at) = plan.intro_duck_start {
            self.timers
                .schedule_in(&mut self.intro_timers, t0 + duck_at, Event::IntroDuck);
        }

        let lead_in = plan.lead_in;
        self.program = Some(Program { run, plan });

        if lead_in > 0.0 {
            self.timers
                .schedule_in(&mut self.intro_timers, t0 + lead_in, Event::RunStart);
            self.state = if has_intro {
                PlaybackState::PlayingIntro
            } else {
                PlaybackState::CountingIn
            };
        } else {
            self.begin_run(t0, 0.0);
        }
        log::info!("▶️ Session started ({:?}, lead-in {:.2}s)", self.state, lead_in);

        self.tick();
        Ok(())
    }

    /// Anchors the clock and (re)schedules the timing beeps still ahead of `offset`.
    fn begin_run(&mut self, at: f64, offset: f64) {
        let Some(program) = &self.program else {
            return;
        };
        let run = program.run.clone();
        let pending = program.plan.pending_from(offset);

        self.anchor_time = at;
        self.offset_at_anchor = offset;
        self.run_offset = offset;
        self.graph
            .start_run(run, self.frame(at), frames_for(offset, self.sample_rate));
        for delay in pending {
            self.timers
                .schedule_in(&mut self.beep_timers, at + delay, Event::TimingBeep);
        }
        self.state = PlaybackState::Running;
    }

    fn halt_run(&mut self) {
        self.timers.cancel_set(&mut self.beep_timers);
        self.graph.stop_run();
    }

    fn release_coach(&mut self) {
        let now = self.frame(self.clock.now());
        self.graph.coach_off(now);
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        self.release_coach();
        self.run_offset = self.position();
        self.halt_run();
        self.state = PlaybackState::Paused;
        log::info!("⏸️ Paused at {:.2}s", self.run_offset);
    }

    pub fn resume(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }
        self.release_coach();
        let now = self.clock.now();
        self.begin_run(now, self.run_offset);
        log::info!("▶️ Resumed from {:.2}s", self.run_offset);
        self.tick();
    }

    /// Restarts the run music from 0. The intro and starter beeps are not replayed.
    pub fn restart(&mut self) {
        if !matches!(self.state, PlaybackState::Running | PlaybackState::Paused) {
            return;
        }
        self.release_coach();
        self.halt_run();
        let now = self.clock.now();
        self.begin_run(now, 0.0);
        log::info!("⏮️ Run restarted");
        self.tick();
    }

    /// Tears the whole session down.
    pub fn stop(&mut self) {
        self.release_coach();
        if self.state == PlaybackState::Idle {
            return;
        }
        self.timers.cancel_set(&mut self.intro_timers);
        self.halt_run();
        self.timers.clear();
        self.graph.stop_intro();
        self.run_offset = 0.0;
        self.state = PlaybackState::Idle;
        log::info!("⏹️ Session stopped");
    }

    /// Dispatches due events to the graph and detects the end of the run.
    pub fn tick(&mut self) {
        let horizon = self.clock.now() + self.schedule_ahead;
        loop {
            let due = self.timers.drain_due(horizon);
            if due.is_empty() {
                break;
            }
            for (at, event) in due {
                self.dispatch(at, event);
            }
        }

        if self.state == PlaybackState::Running {
            let duration = self.run_duration();
            if self.position() >= duration {
                // a beep due on the last frame was dispatched above and rings out
                self.release_coach();
                self.timers.cancel_set(&mut self.beep_timers);
                self.graph.end_run();
                self.run_offset = duration;
                self.state = PlaybackState::Ended;
                log::info!("🏁 Run finished");
            }
        }
    }

    fn dispatch(&mut self, at: f64, event: Event) {
        match event {
            Event::StarterBeep | Event::TimingBeep => {
                self.graph.trigger_beep(self.frame(at));
                let kind = if event == Event::StarterBeep {
                    BeepKind::Starter
                } else {
                    BeepKind::Timing
                };
                self.fired.push(FiredBeep { kind, at });
                log::debug!("beep {:?} at {:.3}", kind, at);
            }
            Event::IntroDuck => {
                self.graph.duck_intro(self.frame(at), self.intro_duck_gain);
            }
            Event::RunStart => {
                self.release_coach();
                self.intro_timers = TimerSet::new();
                self.begin_run(at, 0.0);
                log::info!("🏃 Run started");
            }
        }
    }

    /// Coach talk on: ducks the right channel and opens the mic.
    pub fn coach_on(&mut self) -> TimerResult<()> {
        let now = self.frame(self.clock.now());
        self.graph.coach_on(now)
    }

    pub fn coach_off(&mut self) {
        self.release_coach();
    }

    pub fn toggle_coach(&mut self) -> TimerResult<bool> {
        if self.graph.is_coach_active() {
            self.coach_off();
            Ok(false)
        } else {
            self.coach_on()?;
            Ok(true)
        }
    }
}
