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

//! A two-sound sampler engine.
//!
//! Each sound is a clean/excited pair of samples blended by a mix control.
//! Notes restart at a loop boundary for sample-accurate looping, and the
//! mixed signal runs through a shared filter and limiter. The engine is split
//! into a real-time [`Engine`] for the audio thread and a [`Controller`] for
//! everything else; [`create`] builds both.

pub mod audio;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod mixer;
pub mod params;
pub mod plugin;
pub mod samples;
pub mod transport;
pub mod voices;

#[cfg(test)]
mod testutil;

pub use audio::ProcessSpec;
pub use engine::{create, Controller, Engine, EngineError, MidiEvent};
pub use plugin::Plugin;
