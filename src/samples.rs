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

//! In-memory samples and the libraries they are loaded from.
//!
//! This module provides:
//! - Decoding audio files into planar f32 samples
//! - Linear-interpolation transcoding to the engine rate
//! - Named sound libraries with clean/excited pairs

mod decoder;
mod error;
mod library;
mod sample;

pub use decoder::{decode_bytes, decode_file};
pub use error::SampleError;
pub use library::{
    DirectoryLibrary, MemoryLibrary, SamplePair, SoundLibrary, CLEAN_SUFFIX, EXCITED_SUFFIX,
};
pub use sample::Sample;
