// src/effects/compressor.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub is_active: bool,
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_gain_db: f32,
}

impl CompressorParams {
    /// Tuned for a close talking mic over music: fast attack, slow release.
    pub fn voice() -> Self {
        Self {
            is_active: true,
            threshold_db: -24.0,
            ratio: 4.0,
            attack_ms: 5.0,
            release_ms: 120.0,
            makeup_gain_db: 6.0,
        }
    }
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self::voice()
    }
}

/// Feed-forward peak compressor for the coach mic chain.
/// Runs inside the render callback: no allocation in `process`.
pub struct CompressorNode {
    params: CompressorParams,
    sample_rate: f32,
    envelope: f32,
}

impl CompressorNode {
    pub fn new(sample_rate: f32, params: CompressorParams) -> Self {
        Self {
            params,
            sample_rate,
            envelope: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    /// Processes a chunk of mono samples in place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        let p = self.params;
        if !p.is_active {
            return;
        }

        let attack_coef = (-1.0 / (p.attack_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
        let release_coef = (-1.0 / (p.release_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
        let makeup_linear = 10.0_f32.powf(p.makeup_gain_db / 20.0);
        let slope = 1.0 - 1.0 / p.ratio.max(1.0);

        for sample in buffer.iter_mut() {
            let input_level = sample.abs();

            let coef = if input_level > self.envelope { attack_coef } else { release_coef };
            self.envelope = coef * (self.envelope - input_level) + input_level;

            let env_db = 20.0 * self.envelope.max(1e-5).log10();
            let gain_reduction_db = if env_db > p.threshold_db {
                (env_db - p.threshold_db) * slope
            } else {
                0.0
            };

            let gain_reduction_linear = 10.0_f32.powf(-gain_reduction_db / 20.0);
            *sample *= gain_reduction_linear * makeup_linear;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_input_is_reduced() {
        let params = CompressorParams { makeup_gain_db: 0.0, ..CompressorParams::voice() };
        let mut comp = CompressorNode::new(48_000.0, params);
        let mut block = vec![0.9f32; 4_800];
        comp.process(&mut block);
        // after the attack settles, -0.9 dBFS over a -24 dB threshold at 4:1
        assert!(block[4_799] < 0.2, "got {}", block[4_799]);
    }

    #[test]
    fn quiet_input_only_gets_makeup() {
        let mut comp = CompressorNode::new(48_000.0, CompressorParams::voice());
        let mut block = vec![0.01f32; 480];
        comp.process(&mut block);
        let makeup = 10.0_f32.powf(6.0 / 20.0);
        assert!((block[479] - 0.01 * makeup).abs() < 1e-4);
    }

    #[test]
    fn bypass_leaves_signal_alone() {
        let params = CompressorParams { is_active: false, ..CompressorParams::voice() };
        let mut comp = CompressorNode::new(48_000.0, params);
        let mut block = vec![0.9f32; 16];
        comp.process(&mut block);
        assert!(block.iter().all(|&s| s == 0.9));
    }
}
