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

//! Clean/excited crossfade and the shared output stage.

use tracing::debug;

use crate::audio::{ProcessSpec, MAX_CHANNELS};
use crate::dsp::{FilterCoefficients, FilterMode, Limiter, StateVariableFilter};
use crate::params::ParameterSnapshot;

/// Returns the (clean, excited) gains for a mix amount in percent. The pair
/// always sums to one.
pub fn crossfade_gains(mix: f32) -> (f32, f32) {
    let excited = (mix / 100.0).clamp(0.0, 1.0);
    (1.0 - excited, excited)
}

/// The rendered clean and excited variants of one sound, for one channel.
#[derive(Debug, Clone, Copy)]
pub struct SourcePair<'a> {
    pub clean: &'a [f32],
    pub excited: &'a [f32],
}

/// Adds every pair into `destination` weighted by the crossfade gains.
///
/// The destination is summed into, not overwritten; callers clear it first
/// unless they mean to keep what is there.
pub fn mix_sources(destination: &mut [f32], sources: &[SourcePair<'_>], mix: f32) {
    let (clean_gain, excited_gain) = crossfade_gains(mix);
    for pair in sources {
        // Skip silent halves at the endpoints so the other half passes exactly
        if clean_gain != 0.0 {
            for (out, clean) in destination.iter_mut().zip(pair.clean) {
                *out += clean * clean_gain;
            }
        }
        if excited_gain != 0.0 {
            for (out, excited) in destination.iter_mut().zip(pair.excited) {
                *out += excited * excited_gain;
            }
        }
    }
}

/// The filter and limiter applied to the mixed signal, one of each per
/// output channel.
#[derive(Debug)]
pub struct EffectsChain {
    mode: FilterMode,
    sample_rate: f32,
    filters: [StateVariableFilter; MAX_CHANNELS],
    limiters: [Limiter; MAX_CHANNELS],
}

impl EffectsChain {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            sample_rate: 0.0,
            filters: [StateVariableFilter::new(); MAX_CHANNELS],
            limiters: [Limiter::new(0.0); MAX_CHANNELS],
        }
    }

    /// Resets all state and configures the stages for a new host setup.
    /// Never called while a block is being processed.
    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate as f32;
        for filter in self.filters.iter_mut() {
            filter.reset();
        }
        for limiter in self.limiters.iter_mut() {
            limiter.prepare(self.sample_rate);
        }
        debug!(%spec, mode = ?self.mode, "Effects chain prepared");
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.mode
    }

    /// Filters then limits one block in place. Coefficients come from the
    /// block's parameter snapshot and are fixed for the whole block.
    pub fn process(&mut self, channels: &mut [&mut [f32]], snapshot: &ParameterSnapshot) {
        let coefficients = FilterCoefficients::new(
            snapshot.filter_frequency,
            snapshot.filter_resonance,
            self.sample_rate,
        );
        for ((samples, filter), limiter) in channels
            .iter_mut()
            .zip(self.filters.iter_mut())
            .zip(self.limiters.iter_mut())
        {
            filter.process_block(samples, self.mode, &coefficients);
            limiter.process_block(samples);
        }
    }
}
