// src/export/mod.rs

pub mod wav;

pub use wav::encode_wav;

use chrono::{DateTime, TimeZone};

use crate::beeps::BeepPlan;
use crate::buffer::{frames_for, PcmBuffer};
use crate::config::EngineConfig;
use crate::timeline::RUN_CHANNELS;

/// Offline mixdown of a whole session.
///
/// Uses the same [`BeepPlan`] the live controller schedules from, so every event
/// lands on the same frame: the intro (or silent pre-roll) fills `[0, lead_in)`,
/// the run buffer starts at `lead_in`, and beeps are summed at their session
/// times. The intro tail duck is a static gain here instead of the live ramp.
pub fn render_export(
    run: &PcmBuffer,
    intro: Option<&PcmBuffer>,
    beep: &PcmBuffer,
    plan: &BeepPlan,
    config: &EngineConfig,
) -> PcmBuffer {
    let sr = run.sample_rate;
    let lead = frames_for(plan.lead_in, sr);
    let total = lead + run.frames();
    let mut out = PcmBuffer::silent(RUN_CHANNELS, total, sr);

    if let Some(intro) = intro {
        let duck_from = plan
            .intro_duck_start
            .map(|t| frames_for(t, sr))
            .unwrap_or(usize::MAX);
        let len = intro.frames().min(lead);
        for ch in 0..RUN_CHANNELS {
            let src = intro.channel_or_first(ch);
            let dst = out.channel_mut(ch);
            for i in 0..len {
                let gain = if i >= duck_from { config.intro_duck_gain } else { 1.0 };
                dst[i] = src[i] * gain;
            }
        }
    }

    for ch in 0..RUN_CHANNELS {
        let src = run.channel_or_first(ch);
        out.channel_mut(ch)[lead..lead + src.len()].copy_from_slice(src);
    }

    let mut placed = 0usize;
    for t in plan.session_beep_times() {
        let start = frames_for(t, sr);
        // a "0 seconds left" beep starts on the frame after the export ends
        if start >= total {
            continue;
        }
        let len = beep.frames().min(total - start);
        for ch in 0..RUN_CHANNELS {
            let src = beep.channel_or_first(ch);
            let dst = &mut out.channel_mut(ch)[start..start + len];
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s;
            }
        }
        placed += 1;
    }

    for ch in 0..RUN_CHANNELS {
        for s in out.channel_mut(ch) {
            *s = s.clamp(-1.0, 1.0);
        }
    }

    log::info!(
        "📼 Export rendered: {:.2}s ({} beeps, lead-in {:.2}s)",
        out.duration_secs(),
        placed,
        plan.lead_in
    );
    out
}

/// `nsc-<mode>-<YYYY-MM-DDTHH-MM-SS>.wav`
pub fn export_file_name<Tz: TimeZone>(mode: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("nsc-{}-{}.wav", mode, at.format("%Y-%m-%dT%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfiguration;
    use approx::assert_abs_diff_eq;
    use chrono::Utc;

    const RATE: u32 = 100;

    fn dc(level: f32, seconds: f64, channels: usize) -> PcmBuffer {
        PcmBuffer::from_planar(vec![vec![level; frames_for(seconds, RATE)]; channels], RATE)
    }

    fn click() -> PcmBuffer {
        PcmBuffer::from_planar(vec![vec![0.5; 3]], RATE)
    }

    fn run_config(total: f64, marks: &[f64], starter: bool) -> RunConfiguration {
        RunConfiguration {
            total_duration_seconds: total,
            beep_marks: marks.to_vec(),
            starter_beep_enabled: starter,
            dark_mode: false,
        }
    }

    #[test]
    fn intro_precedes_run_and_tail_is_ducked() {
        let cfg = run_config(10.0, &[5.0], true);
        let plan = BeepPlan::new(&cfg, Some(4.0), 3.0);
        let run = dc(0.2, 10.0, 2);
        let intro = dc(0.4, 4.0, 1);
        let out = render_export(&run, Some(&intro), &click(), &plan, &EngineConfig::default());

        assert_eq!(out.frames(), 1_400);
        assert_abs_diff_eq!(out.channel(1)[50], 0.4, epsilon = 1e-6);
        // duck window is the last 3 s of the intro
        assert_abs_diff_eq!(out.channel(0)[150], 0.3, epsilon = 1e-6);
        // starter beeps at 2, 3, 4 s; the last one sits on the first run frame
        assert_abs_diff_eq!(out.channel(0)[200], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(out.channel(0)[400], 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(out.channel(0)[403], 0.2, epsilon = 1e-6);
        // timing beep at run time 5 s
        assert_abs_diff_eq!(out.channel(1)[900], 0.7, epsilon = 1e-6);
    }

    #[test]
    fn starter_without_intro_inserts_the_pre_roll() {
        let cfg = run_config(5.0, &[], true);
        let plan = BeepPlan::new(&cfg, None, 3.0);
        let out = render_export(&dc(0.1, 5.0, 2), None, &click(), &plan, &EngineConfig::default());
        assert_eq!(out.frames(), 800);
        assert_abs_diff_eq!(out.channel(0)[100], 0.5, epsilon = 1e-6);
        assert_eq!(out.channel(0)[150], 0.0);
        assert_abs_diff_eq!(out.channel(0)[300], 0.1, epsilon = 1e-6);
    }

    #[test]
    fn beeps_are_summed_and_hard_clipped() {
        let cfg = run_config(5.0, &[3.0, 3.0], false);
        let plan = BeepPlan::new(&cfg, None, 3.0);
        let out = render_export(&dc(0.3, 5.0, 2), None, &click(), &plan, &EngineConfig::default());
        assert_eq!(out.frames(), 500);
        assert_eq!(out.channel(0)[200], 1.0);
        assert_abs_diff_eq!(out.channel(0)[203], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn beep_near_the_end_is_truncated() {
        let cfg = run_config(1.0, &[0.01, 0.0], false);
        let plan = BeepPlan::new(&cfg, None, 3.0);
        let out = render_export(&dc(0.0, 1.0, 2), None, &click(), &plan, &EngineConfig::default());
        // 0.99 s: partially inside, truncated at the buffer end
        assert_abs_diff_eq!(out.channel(0)[99], 0.5, epsilon = 1e-6);
        // the end-of-run beep starts past the last frame and is left out
        assert_eq!(out.frames(), 100);
    }

    #[test]
    fn file_name_carries_mode_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 3, 7).unwrap();
        assert_eq!(export_file_name("speed", &at), "nsc-speed-2024-05-17T09-03-07.wav");
    }
}
