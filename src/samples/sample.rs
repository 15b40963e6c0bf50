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
use std::time::Duration;

use super::error::SampleError;

/// Decoded PCM audio held entirely in memory.
///
/// Samples are stored planar (one Vec per channel) and never mutated after
/// construction, so a sample can be shared with the audio thread in an `Arc`.
#[derive(Clone, PartialEq)]
pub struct Sample {
    name: String,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl Sample {
    /// Builds a sample from planar channel data. Every channel must have the
    /// same number of frames.
    pub fn from_planar(
        name: impl Into<String>,
        channels: Vec<Vec<f32>>,
        sample_rate: u32,
    ) -> Result<Self, SampleError> {
        let name = name.into();
        if channels.is_empty() {
            return Err(SampleError::InvalidData {
                name,
                reason: "no channels".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(SampleError::InvalidData {
                name,
                reason: "sample rate is zero".to_string(),
            });
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(SampleError::InvalidData {
                name,
                reason: "channels have different lengths".to_string(),
            });
        }

        Ok(Self {
            name,
            channels,
            sample_rate,
        })
    }

    /// Builds a sample from interleaved data. Trailing partial frames are dropped.
    pub fn from_interleaved(
        name: impl Into<String>,
        interleaved: &[f32],
        channel_count: u16,
        sample_rate: u32,
    ) -> Result<Self, SampleError> {
        let num_channels = channel_count as usize;
        if num_channels == 0 {
            return Err(SampleError::InvalidData {
                name: name.into(),
                reason: "no channels".to_string(),
            });
        }

        let num_frames = interleaved.len() / num_channels;
        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        Self::from_planar(name, planar, sample_rate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Returns the given channel. Indices past the last channel wrap around,
    /// so a mono sample feeds every output channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index % self.channels.len()]
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.channels.len() * self.frames() * std::mem::size_of::<f32>()
    }

    /// Returns a copy of this sample at another rate using linear
    /// interpolation. Returns a plain clone when the rates already match.
    pub fn resampled(&self, target_rate: u32) -> Result<Sample, SampleError> {
        if target_rate == 0 {
            return Err(SampleError::InvalidData {
                name: self.name.clone(),
                reason: "target sample rate is zero".to_string(),
            });
        }
        if target_rate == self.sample_rate {
            return Ok(self.clone());
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let source_frames = self.frames();
        let target_frames = (source_frames as f64 * ratio).ceil() as usize;

        let channels = self
            .channels
            .iter()
            .map(|source| {
                (0..target_frames)
                    .map(|target_frame| {
                        let source_pos = target_frame as f64 / ratio;
                        let index = source_pos.floor() as usize;
                        let frac = source_pos.fract() as f32;
                        let s0 = source.get(index).copied().unwrap_or(0.0);
                        let s1 = source.get(index + 1).copied().unwrap_or(s0);
                        s0 + (s1 - s0) * frac
                    })
                    .collect()
            })
            .collect();

        Sample::from_planar(self.name.clone(), channels, target_rate)
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("name", &self.name)
            .field("channels", &self.channel_count())
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
