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

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::engine::EngineConfig;
use super::error::ConfigError;

/// Loop settings for an offline render. Bounds are durations from the start
/// of group one's clean sample.
#[derive(Deserialize, Clone, Debug)]
pub struct LoopSettings {
    start: Option<String>,
    end: Option<String>,
}

impl LoopSettings {
    pub fn start(&self) -> Result<Option<Duration>, ConfigError> {
        parse_optional(&self.start)
    }

    pub fn end(&self) -> Result<Option<Duration>, ConfigError> {
        parse_optional(&self.end)
    }
}

/// A YAML description of an offline render: which sounds to load, which note
/// to hold for how long, and how to loop it.
#[derive(Deserialize, Clone, Debug)]
pub struct RenderJob {
    #[serde(default)]
    engine: EngineConfig,

    /// Directory holding the sound library. Relative paths are resolved
    /// against the job file.
    library: PathBuf,

    /// Sound for group one.
    sound1: String,

    /// Optional sound for group two.
    sound2: Option<String>,

    #[serde(default = "default_note")]
    note: u8,

    #[serde(default = "default_velocity")]
    velocity: u8,

    /// How long the key is held.
    #[serde(default = "default_hold")]
    hold: String,

    /// How long to keep rendering after the key is released.
    #[serde(default = "default_tail")]
    tail: String,

    /// Loop settings; omit to play straight through.
    #[serde(rename = "loop")]
    loop_settings: Option<LoopSettings>,

    /// Clean/excited mix in percent. Overrides the engine parameters.
    mix: Option<f32>,
}

fn default_note() -> u8 {
    60
}

fn default_velocity() -> u8 {
    127
}

fn default_hold() -> String {
    "1s".to_string()
}

fn default_tail() -> String {
    "500ms".to_string()
}

fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    Ok(DurationString::from_string(value.to_string())?.into())
}

fn parse_optional(value: &Option<String>) -> Result<Option<Duration>, ConfigError> {
    value.as_deref().map(parse_duration).transpose()
}

impl RenderJob {
    /// Parses a render job from a YAML file.
    pub fn deserialize(path: &Path) -> Result<RenderJob, ConfigError> {
        let mut job = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<RenderJob>()?;
        if job.library.is_relative() {
            if let Some(parent) = path.parent() {
                job.library = parent.join(&job.library);
            }
        }
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.note > 127 {
            return Err(ConfigError::Invalid {
                field: "note",
                reason: format!("{} is not a MIDI note", self.note),
            });
        }
        if self.velocity > 127 {
            return Err(ConfigError::Invalid {
                field: "velocity",
                reason: format!("{} is not a MIDI velocity", self.velocity),
            });
        }
        self.hold()?;
        self.tail()?;
        if let Some(settings) = &self.loop_settings {
            settings.start()?;
            settings.end()?;
        }
        Ok(())
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn sound1(&self) -> &str {
        &self.sound1
    }

    pub fn sound2(&self) -> Option<&str> {
        self.sound2.as_deref()
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn hold(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.hold)
    }

    pub fn tail(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.tail)
    }

    pub fn loop_settings(&self) -> Option<&LoopSettings> {
        self.loop_settings.as_ref()
    }

    pub fn mix(&self) -> Option<f32> {
        self.mix
    }
}
