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

use std::collections::HashMap;
use std::path::Path;

use config::{Config, File};
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::audio::ProcessSpec;
use crate::dsp::FilterMode;
use crate::params::ParameterId;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;
pub const DEFAULT_CHANNELS: usize = 2;
pub const DEFAULT_VOICES_PER_SLOT: usize = 3;
pub const DEFAULT_HANDOFF_CAPACITY: usize = 8;
pub const DEFAULT_MAX_EVENTS_PER_BLOCK: usize = 256;

/// A YAML representation of the engine settings.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// The rate samples are transcoded to on load, and the default host rate.
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,

    /// The largest block processed in one pass.
    #[serde(default = "default_max_block_size")]
    max_block_size: usize,

    /// The number of output channels.
    #[serde(default = "default_channels")]
    channels: usize,

    /// Polyphony of each sample slot.
    #[serde(default = "default_voices_per_slot")]
    voices_per_slot: usize,

    /// The response of the output filter.
    #[serde(default)]
    filter: FilterMode,

    /// How many sample swaps may wait for the audio thread at once.
    #[serde(default = "default_handoff_capacity")]
    handoff_capacity: usize,

    /// Voice events per block beyond which events are dropped.
    #[serde(default = "default_max_events_per_block")]
    max_events_per_block: usize,

    /// Initial parameter values by name.
    #[serde(default)]
    parameters: HashMap<String, f32>,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_max_block_size() -> usize {
    DEFAULT_MAX_BLOCK_SIZE
}

fn default_channels() -> usize {
    DEFAULT_CHANNELS
}

fn default_voices_per_slot() -> usize {
    DEFAULT_VOICES_PER_SLOT
}

fn default_handoff_capacity() -> usize {
    DEFAULT_HANDOFF_CAPACITY
}

fn default_max_events_per_block() -> usize {
    DEFAULT_MAX_EVENTS_PER_BLOCK
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            channels: DEFAULT_CHANNELS,
            voices_per_slot: DEFAULT_VOICES_PER_SLOT,
            filter: FilterMode::default(),
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
            max_events_per_block: DEFAULT_MAX_EVENTS_PER_BLOCK,
            parameters: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parses an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.process_spec().is_supported() {
            return Err(ConfigError::Invalid {
                field: "channels",
                reason: format!("unsupported layout {}", self.process_spec()),
            });
        }
        if self.voices_per_slot == 0 {
            return Err(ConfigError::Invalid {
                field: "voices_per_slot",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(name) = self
            .parameters
            .keys()
            .find(|name| ParameterId::from_name(name).is_none())
        {
            return Err(ConfigError::Invalid {
                field: "parameters",
                reason: format!("unknown parameter {}", name),
            });
        }
        Ok(())
    }

    /// Builder-style setters, used by tests and embedders.
    pub fn with_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_parameter(mut self, name: &str, value: f32) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn voices_per_slot(&self) -> usize {
        self.voices_per_slot
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn handoff_capacity(&self) -> usize {
        self.handoff_capacity
    }

    pub fn max_events_per_block(&self) -> usize {
        self.max_events_per_block
    }

    pub fn parameters(&self) -> &HashMap<String, f32> {
        &self.parameters
    }

    /// The host setup this configuration describes.
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec::new(self.sample_rate, self.max_block_size, self.channels)
    }
}
