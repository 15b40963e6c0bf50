// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Linear ADSR envelope.

use crate::params::AdsrParameters;

/// The stage an envelope is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// A per-voice linear attack/decay/sustain/release generator.
///
/// Stage times are in seconds. The release slope is fixed when the release
/// begins, so the envelope reaches zero after exactly the release time from
/// whatever level it was at.
#[derive(Debug, Clone, Copy)]
pub struct Adsr {
    parameters: AdsrParameters,
    stage: EnvelopeStage,
    level: f32,
    release_step: f32,
    sample_rate: f32,
}

impl Adsr {
    pub fn new(parameters: AdsrParameters, sample_rate: f32) -> Self {
        Self {
            parameters,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            release_step: 0.0,
            sample_rate,
        }
    }

    /// Replaces the stage times. Takes effect from the next sample.
    pub fn set_parameters(&mut self, parameters: AdsrParameters) {
        self.parameters = parameters;
    }

    pub fn parameters(&self) -> AdsrParameters {
        self.parameters
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    /// Starts the attack from zero.
    pub fn note_on(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeStage::Attack;
    }

    /// Enters the release stage from the current level.
    pub fn note_off(&mut self) {
        if self.stage == EnvelopeStage::Idle || self.stage == EnvelopeStage::Release {
            return;
        }
        self.stage = EnvelopeStage::Release;
        self.release_step = self.step_for(self.level, self.parameters.release);
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }

    /// Per-sample increment covering `distance` in `seconds`. Zero-length
    /// stages jump in a single step.
    fn step_for(&self, distance: f32, seconds: f32) -> f32 {
        let samples = seconds * self.sample_rate;
        if samples > 1.0 {
            distance / samples
        } else {
            f32::INFINITY
        }
    }

    /// Advances one sample and returns the new level.
    pub fn next_sample(&mut self) -> f32 {
        let sustain = self.parameters.sustain;
        match self.stage {
            EnvelopeStage::Idle => {}
            EnvelopeStage::Attack => {
                self.level += self.step_for(1.0, self.parameters.attack);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= self.step_for(1.0 - sustain, self.parameters.decay);
                if self.level <= sustain {
                    self.level = sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => self.level = sustain,
            EnvelopeStage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }
}

/// Anything that carries an [`Adsr`] the engine can retune.
pub trait HasEnvelope {
    fn envelope(&self) -> &Adsr;

    fn envelope_mut(&mut self) -> &mut Adsr;

    /// Pushes new stage times into the envelope.
    fn set_envelope(&mut self, parameters: AdsrParameters) {
        self.envelope_mut().set_parameters(parameters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(attack: f32, decay: f32, sustain: f32, release: f32) -> AdsrParameters {
        AdsrParameters {
            attack,
            decay,
            sustain,
            release,
        }
    }

    #[test]
    fn test_attack_reaches_peak() {
        let mut adsr = Adsr::new(parameters(0.01, 0.01, 0.5, 0.01), 1000.0);
        adsr.note_on();
        let levels: Vec<f32> = (0..11).map(|_| adsr.next_sample()).collect();
        assert!((levels[0] - 0.1).abs() < 1e-6);
        assert!((levels[9] - 1.0).abs() < 1e-5);
        assert_eq!(adsr.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn test_decay_to_sustain() {
        let mut adsr = Adsr::new(parameters(0.0, 0.01, 0.5, 0.01), 1000.0);
        adsr.note_on();
        assert_eq!(adsr.next_sample(), 1.0);
        for _ in 0..20 {
            adsr.next_sample();
        }
        assert_eq!(adsr.stage(), EnvelopeStage::Sustain);
        assert_eq!(adsr.level(), 0.5);
    }

    #[test]
    fn test_instant_envelope_holds_unity() {
        let mut adsr = Adsr::new(parameters(0.0, 0.0, 1.0, 0.0), 48000.0);
        adsr.note_on();
        for _ in 0..4 {
            assert_eq!(adsr.next_sample(), 1.0);
        }
        adsr.note_off();
        assert_eq!(adsr.next_sample(), 0.0);
        assert!(!adsr.is_active());
    }

    #[test]
    fn test_release_is_linear_from_current_level() {
        let mut adsr = Adsr::new(parameters(0.0, 0.0, 0.8, 0.01), 1000.0);
        adsr.note_on();
        adsr.next_sample();
        adsr.next_sample();
        adsr.note_off();
        let first = adsr.next_sample();
        assert!((first - 0.72).abs() < 1e-5);
        for _ in 0..10 {
            adsr.next_sample();
        }
        assert_eq!(adsr.stage(), EnvelopeStage::Idle);
        assert_eq!(adsr.level(), 0.0);
    }

    #[test]
    fn test_note_off_while_idle() {
        let mut adsr = Adsr::new(AdsrParameters::default(), 48000.0);
        adsr.note_off();
        assert_eq!(adsr.stage(), EnvelopeStage::Idle);
    }
}
