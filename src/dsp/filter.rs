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

//! Topology-preserving state variable filter.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Which filter response the effects chain applies.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Off,
    LowPass,
    BandPass,
}

/// Filter coefficients for one block. Computed once from the cutoff and Q,
/// then shared by every channel's filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCoefficients {
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

impl FilterCoefficients {
    /// `resonance` is the filter Q; 0.707 is a flat Butterworth response.
    pub fn new(cutoff_hz: f32, resonance: f32, sample_rate: f32) -> Self {
        let nyquist_guard = sample_rate * 0.49;
        let cutoff = cutoff_hz.clamp(20.0, nyquist_guard.max(20.0));
        let g = (PI * cutoff / sample_rate).tan();
        let k = 1.0 / resonance.max(0.1);
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;
        Self { k, a1, a2, a3 }
    }
}

/// Per-channel filter state.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateVariableFilter {
    z1: f32,
    z2: f32,
}

impl StateVariableFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Filters one sample. Returns `input` unchanged when `mode` is off.
    #[inline]
    pub fn process(&mut self, input: f32, mode: FilterMode, c: &FilterCoefficients) -> f32 {
        if mode == FilterMode::Off {
            return input;
        }

        let v3 = input - self.z2;
        let v1 = c.a1 * self.z1 + c.a2 * v3;
        let v2 = self.z2 + c.a2 * self.z1 + c.a3 * v3;

        // Clamp to keep a runaway state from turning into inf/NaN
        self.z1 = (2.0 * v1 - self.z1).clamp(-1e6, 1e6);
        self.z2 = (2.0 * v2 - self.z2).clamp(-1e6, 1e6);

        match mode {
            FilterMode::LowPass => v2,
            // Normalized so the peak gain is unity at the cutoff
            FilterMode::BandPass => c.k * v1,
            FilterMode::Off => input,
        }
    }

    /// Filters a block in place.
    pub fn process_block(&mut self, samples: &mut [f32], mode: FilterMode, c: &FilterCoefficients) {
        if mode == FilterMode::Off {
            return;
        }
        for sample in samples.iter_mut() {
            *sample = self.process(*sample, mode, c);
        }
    }
}
