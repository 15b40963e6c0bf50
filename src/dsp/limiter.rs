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

//! Peak limiter with instant attack and exponential release.

/// Ceiling in linear gain (0 dBFS).
pub const LIMITER_THRESHOLD: f32 = 1.0;

/// Time for the gain to recover after a peak.
pub const LIMITER_RELEASE_SECONDS: f32 = 0.1;

/// Distance from unity at which the recovering gain snaps back to exactly 1.
const UNITY_SNAP: f32 = 1e-6;

/// Per-channel peak limiter.
///
/// The gain drops immediately to whatever keeps a peak at the threshold and
/// recovers toward unity with a one-pole release. Output is finally clamped
/// to the threshold. While the gain sits at unity and the input stays under
/// the threshold, samples pass through bit-exact.
#[derive(Debug, Clone, Copy)]
pub struct Limiter {
    gain: f32,
    release_coefficient: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        let mut limiter = Self {
            gain: 1.0,
            release_coefficient: 0.0,
        };
        limiter.prepare(sample_rate);
        limiter
    }

    /// Resets the gain and recomputes the release for a new sample rate.
    pub fn prepare(&mut self, sample_rate: f32) {
        self.gain = 1.0;
        self.release_coefficient = if sample_rate > 0.0 {
            (-1.0 / (LIMITER_RELEASE_SECONDS * sample_rate)).exp()
        } else {
            0.0
        };
    }

    /// The gain currently applied.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let peak = input.abs();
        let target = if peak > LIMITER_THRESHOLD {
            LIMITER_THRESHOLD / peak
        } else {
            1.0
        };

        if target < self.gain {
            self.gain = target;
        } else if self.gain < 1.0 {
            self.gain = target + (self.gain - target) * self.release_coefficient;
            if self.gain > 1.0 - UNITY_SNAP {
                self.gain = 1.0;
            }
        }

        if self.gain == 1.0 {
            return input.clamp(-LIMITER_THRESHOLD, LIMITER_THRESHOLD);
        }
        (input * self.gain).clamp(-LIMITER_THRESHOLD, LIMITER_THRESHOLD)
    }

    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sine;

    #[test]
    fn test_quiet_signal_is_untouched() {
        let mut limiter = Limiter::new(48000.0);
        let original = sine(440.0, 0.99, 4800, 48000);
        let mut signal = original.clone();
        limiter.process_block(&mut signal);
        assert_eq!(signal, original);
    }

    #[test]
    fn test_peaks_are_held_at_threshold() {
        let mut limiter = Limiter::new(48000.0);
        let mut signal = sine(440.0, 4.0, 4800, 48000);
        limiter.process_block(&mut signal);
        assert!(signal.iter().all(|s| s.abs() <= LIMITER_THRESHOLD));
        assert!(limiter.gain() < 0.5);
    }

    #[test]
    fn test_gain_recovers_after_release() {
        let mut limiter = Limiter::new(48000.0);
        assert_eq!(limiter.process(2.0), 1.0);
        assert_eq!(limiter.gain(), 0.5);

        // 100ms is one time constant
        for _ in 0..4800 {
            limiter.process(0.0);
        }
        let expected = 1.0 - 0.5 * (-1.0f32).exp();
        assert!((limiter.gain() - expected).abs() < 1e-3);

        // Eventually back to unity, after which the signal is untouched
        for _ in 0..96000 {
            limiter.process(0.0);
        }
        assert_eq!(limiter.gain(), 1.0);
        assert_eq!(limiter.process(0.25), 0.25);
    }

    #[test]
    fn test_prepare_resets_gain() {
        let mut limiter = Limiter::new(48000.0);
        limiter.process(10.0);
        limiter.prepare(44100.0);
        assert_eq!(limiter.gain(), 1.0);
    }
}
