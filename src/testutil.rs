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

//! Shared helpers for unit tests: synthetic samples and temporary WAV files.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::samples::Sample;

/// Writes interleaved float samples to a 32-bit float WAV file.
pub fn write_wav(
    path: &Path,
    interleaved: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for sample in interleaved {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// A mono sample holding a constant value, handy for exact gain checks.
pub fn constant_sample(name: &str, value: f32, frames: usize, sample_rate: u32) -> Arc<Sample> {
    Arc::new(Sample::from_planar(name, vec![vec![value; frames]], sample_rate).unwrap())
}

/// A mono sample whose value at frame `i` is `i / frames`.
pub fn ramp_sample(name: &str, frames: usize, sample_rate: u32) -> Arc<Sample> {
    let data = (0..frames).map(|i| i as f32 / frames as f32).collect();
    Arc::new(Sample::from_planar(name, vec![data], sample_rate).unwrap())
}

/// Generates a sine wave at the given frequency and amplitude.
pub fn sine(frequency: f32, amplitude: f32, frames: usize, sample_rate: u32) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Allocates `channels` zeroed output channels of `frames` samples.
pub fn output_buffers(channels: usize, frames: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0; frames]; channels]
}
