// src/decoder/resample.rs

use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::buffer::PcmBuffer;
use crate::decoder::dsp;
use crate::error::{TimerError, TimerResult};

fn resample_err(e: impl std::fmt::Display) -> TimerError {
    TimerError::Decode(format!("resampling failed: {e}"))
}

pub fn build_resampler(
    src_rate: u32,
    dst_rate: u32,
    channels: usize,
) -> TimerResult<Option<SincFixedIn<f32>>> {
    if src_rate == dst_rate {
        return Ok(None);
    }
    if src_rate == 0 || dst_rate == 0 {
        return Err(TimerError::Decode(format!(
            "invalid sample rate conversion {src_rate} -> {dst_rate}"
        )));
    }
    let ratio = dst_rate as f64 / src_rate as f64;
    let sinc_len = 256usize;
    let window = WindowFunction::BlackmanHarris2;
    let f_cutoff = calculate_cutoff(sinc_len, window);
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    let chunk_size = 1024;
    let r = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, channels)
        .map_err(resample_err)?;
    Ok(Some(r))
}

/// Feeds the resampler one full input chunk, or returns `None` when fewer
/// frames than it asks for are staged.
fn next_full_block(
    resampler: &mut SincFixedIn<f32>,
    staged: &mut [Vec<f32>],
) -> TimerResult<Option<Vec<Vec<f32>>>> {
    let need = resampler.input_frames_next();
    if dsp::planar_len(staged) < need {
        return Ok(None);
    }
    let block = dsp::take_from_planar(staged, need);
    resampler.process(&block, None).map(Some).map_err(resample_err)
}

/// Converts a whole buffer to `target_rate`.
///
/// Equal rates hand the input straight back. Otherwise the result has exactly
/// `ceil(duration * target_rate)` frames per channel with the filter delay removed.
pub fn resample_to_rate(buffer: PcmBuffer, target_rate: u32) -> TimerResult<PcmBuffer> {
    let source_rate = buffer.sample_rate;
    let channels = buffer.channel_count();
    let Some(mut resampler) = build_resampler(source_rate, target_rate, channels)? else {
        return Ok(buffer);
    };

    let expected = (buffer.duration_secs() * target_rate as f64).ceil() as usize;
    let delay = resampler.output_delay();
    let mut staged = buffer.into_planar();
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    while let Some(block) = next_full_block(&mut resampler, &mut staged)? {
        dsp::extend_planar(&mut out, block);
    }
    let leftover = dsp::planar_len(&staged);
    if leftover > 0 {
        let rest = dsp::take_from_planar(&mut staged, leftover);
        let block = resampler
            .process_partial(Some(rest.as_slice()), None)
            .map_err(resample_err)?;
        dsp::extend_planar(&mut out, block);
    }
    // flush the sinc tail until the delayed signal is fully out
    while dsp::planar_len(&out) < expected + delay {
        let block = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(resample_err)?;
        if block.is_empty() || block[0].is_empty() {
            break;
        }
        dsp::extend_planar(&mut out, block);
    }

    for ch in &mut out {
        let skip = delay.min(ch.len());
        ch.drain(..skip);
        ch.resize(expected, 0.0);
    }
    log::debug!(
        "resampled {} ch {} Hz -> {} Hz ({} frames)",
        channels,
        source_rate,
        target_rate,
        expected
    );
    Ok(PcmBuffer::from_planar(out, target_rate))
}
