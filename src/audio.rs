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
use std::fmt;

/// Largest number of output channels the engine will accept.
pub const MAX_CHANNELS: usize = 2;

/// Processing configuration negotiated with the host before audio flows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Largest block the host will ask for in one call
    pub max_block_size: usize,
    /// Number of output channels
    pub num_channels: usize,
}

impl ProcessSpec {
    pub fn new(sample_rate: u32, max_block_size: usize, num_channels: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            num_channels,
        }
    }

    /// Returns true if the engine can run with this configuration.
    pub fn is_supported(&self) -> bool {
        self.sample_rate > 0
            && self.max_block_size > 0
            && (1..=MAX_CHANNELS).contains(&self.num_channels)
    }

    /// Converts milliseconds to a sample count at this spec's rate.
    pub fn ms_to_samples(&self, ms: f64) -> u64 {
        ms_to_samples(ms, self.sample_rate)
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz, {} frames, {} channel(s)",
            self.sample_rate, self.max_block_size, self.num_channels
        )
    }
}

/// Converts milliseconds to samples, rounding to the nearest sample.
pub fn ms_to_samples(ms: f64, sample_rate: u32) -> u64 {
    if ms <= 0.0 || !ms.is_finite() {
        return 0;
    }
    (ms * sample_rate as f64 / 1000.0).round() as u64
}

/// Converts a sample count to milliseconds.
pub fn samples_to_ms(samples: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 * 1000.0 / sample_rate as f64
}

/// A planar scratch buffer with fixed capacity.
///
/// Capacity is reserved up front; changing the active length within it never
/// allocates, so these buffers can be reused from the audio callback.
#[derive(Clone, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    len: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer with room for `capacity` frames per channel.
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            channels: vec![vec![0.0; capacity]; num_channels],
            len: capacity,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// The number of frames currently in use.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Sets the active length and zeroes it. The length is capped at capacity.
    pub fn clear(&mut self, len: usize) {
        self.len = len.min(self.capacity());
        for channel in self.channels.iter_mut() {
            channel[..self.len].fill(0.0);
        }
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index][..self.len]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index][..self.len]
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.num_channels())
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
