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

//! Sound libraries: named sources of decoded samples.
//!
//! A sound is either a single sample or a clean/excited pair. Libraries only
//! run on the control thread; the engine never calls into them.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::decoder::decode_file;
use super::error::SampleError;
use super::sample::Sample;

/// File stem suffix of the unprocessed half of a pair.
pub const CLEAN_SUFFIX: &str = "_clean";
/// File stem suffix of the processed half of a pair.
pub const EXCITED_SUFFIX: &str = "_excited";

/// The clean and excited variants of one sound.
#[derive(Debug, Clone)]
pub struct SamplePair {
    pub clean: Arc<Sample>,
    pub excited: Arc<Sample>,
}

/// A source of named, decoded samples.
pub trait SoundLibrary: Send + Sync {
    /// Lists the sound names this library can load, sorted.
    fn list_available(&self) -> Vec<String>;

    /// Loads a single sound by name.
    fn load_by_name(&self, name: &str) -> Result<Arc<Sample>, SampleError>;

    /// Loads the clean/excited pair for a sound.
    fn load_pair_by_name(&self, name: &str) -> Result<SamplePair, SampleError>;
}

/// A library backed by a directory of audio files.
///
/// `<name>_clean.<ext>` and `<name>_excited.<ext>` form the pair `<name>`;
/// any other audio file is the single sound named by its file stem. Decoded
/// samples are cached and resampled to the target rate when one is set.
pub struct DirectoryLibrary {
    root: PathBuf,
    target_sample_rate: Option<u32>,
    cache: RwLock<HashMap<PathBuf, Arc<Sample>>>,
}

const AUDIO_EXTENSIONS: [&str; 7] = ["wav", "wave", "flac", "mp3", "ogg", "aif", "aiff"];

impl DirectoryLibrary {
    /// Creates a library over `root`. Fails if the directory can't be read.
    pub fn new(root: impl Into<PathBuf>, target_sample_rate: Option<u32>) -> Result<Self, SampleError> {
        let root = root.into();
        fs::read_dir(&root)?;
        Ok(Self {
            root,
            target_sample_rate,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.read().values().map(|s| s.memory_size()).sum()
    }

    /// Returns (file stem, path) for every audio file in the directory.
    fn audio_files(&self) -> Vec<(String, PathBuf)> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = ?self.root, error = %e, "Unable to read sound library");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?.to_string();
                Some((stem, path))
            })
            .collect()
    }

    fn find_file(&self, stem: &str) -> Option<PathBuf> {
        let mut matches: Vec<PathBuf> = self
            .audio_files()
            .into_iter()
            .filter(|(s, _)| s == stem)
            .map(|(_, path)| path)
            .collect();
        // Pick deterministically when several extensions share a stem
        matches.sort();
        matches.into_iter().next()
    }

    /// Loads a file into memory, returning a cached version if already loaded.
    fn load_file(&self, path: &Path, name: &str) -> Result<Arc<Sample>, SampleError> {
        if let Some(sample) = self.cache.read().get(path) {
            debug!(path = ?path, "Using cached sample");
            return Ok(sample.clone());
        }

        info!(path = ?path, "Loading sample into memory");
        let mut sample = decode_file(path, name)?;
        if let Some(target_rate) = self.target_sample_rate {
            if sample.sample_rate() != target_rate {
                info!(
                    source_rate = sample.sample_rate(),
                    target_rate, "Transcoding sample"
                );
                sample = sample.resampled(target_rate)?;
            }
        }

        info!(
            path = ?path,
            channels = sample.channel_count(),
            sample_rate = sample.sample_rate(),
            duration_ms = sample.duration().as_millis(),
            memory_kb = sample.memory_size() / 1024,
            "Sample loaded"
        );

        let sample = Arc::new(sample);
        self.cache.write().insert(path.to_path_buf(), sample.clone());
        Ok(sample)
    }
}

impl SoundLibrary for DirectoryLibrary {
    fn list_available(&self) -> Vec<String> {
        self.audio_files()
            .into_iter()
            .map(|(stem, _)| base_name(&stem).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn load_by_name(&self, name: &str) -> Result<Arc<Sample>, SampleError> {
        let path = self
            .find_file(name)
            .or_else(|| self.find_file(&format!("{}{}", name, CLEAN_SUFFIX)))
            .ok_or_else(|| SampleError::NotFound(name.to_string()))?;
        self.load_file(&path, name)
    }

    fn load_pair_by_name(&self, name: &str) -> Result<SamplePair, SampleError> {
        let clean_name = format!("{}{}", name, CLEAN_SUFFIX);
        let excited_name = format!("{}{}", name, EXCITED_SUFFIX);
        let (clean_path, excited_path) =
            match (self.find_file(&clean_name), self.find_file(&excited_name)) {
                (Some(clean), Some(excited)) => (clean, excited),
                _ => return Err(SampleError::NotFound(name.to_string())),
            };

        Ok(SamplePair {
            clean: self.load_file(&clean_path, &clean_name)?,
            excited: self.load_file(&excited_path, &excited_name)?,
        })
    }
}

impl std::fmt::Debug for DirectoryLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryLibrary")
            .field("root", &self.root)
            .field("target_sample_rate", &self.target_sample_rate)
            .field("cached_samples", &self.cache.read().len())
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

/// A library of samples that were decoded elsewhere, keyed by name. Pairs are
/// registered as `<name>_clean` / `<name>_excited`.
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    samples: RwLock<HashMap<String, Arc<Sample>>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single sound.
    pub fn insert(&self, name: &str, sample: Arc<Sample>) {
        self.samples.write().insert(name.to_string(), sample);
    }

    /// Registers a clean/excited pair under one name.
    pub fn insert_pair(&self, name: &str, pair: SamplePair) {
        let mut samples = self.samples.write();
        samples.insert(format!("{}{}", name, CLEAN_SUFFIX), pair.clean);
        samples.insert(format!("{}{}", name, EXCITED_SUFFIX), pair.excited);
    }
}

impl SoundLibrary for MemoryLibrary {
    fn list_available(&self) -> Vec<String> {
        self.samples
            .read()
            .keys()
            .map(|name| base_name(name).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn load_by_name(&self, name: &str) -> Result<Arc<Sample>, SampleError> {
        let samples = self.samples.read();
        samples
            .get(name)
            .or_else(|| samples.get(&format!("{}{}", name, CLEAN_SUFFIX)))
            .cloned()
            .ok_or_else(|| SampleError::NotFound(name.to_string()))
    }

    fn load_pair_by_name(&self, name: &str) -> Result<SamplePair, SampleError> {
        let samples = self.samples.read();
        match (
            samples.get(&format!("{}{}", name, CLEAN_SUFFIX)),
            samples.get(&format!("{}{}", name, EXCITED_SUFFIX)),
        ) {
            (Some(clean), Some(excited)) => Ok(SamplePair {
                clean: clean.clone(),
                excited: excited.clone(),
            }),
            _ => Err(SampleError::NotFound(name.to_string())),
        }
    }
}

/// Strips a pair suffix from a file stem.
fn base_name(stem: &str) -> &str {
    stem.strip_suffix(CLEAN_SUFFIX)
        .or_else(|| stem.strip_suffix(EXCITED_SUFFIX))
        .unwrap_or(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{constant_sample, write_wav};

    fn library_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("pad_clean.wav"), &[0.1; 100], 1, 48000).unwrap();
        write_wav(&dir.path().join("pad_excited.wav"), &[0.2; 100], 1, 48000).unwrap();
        write_wav(&dir.path().join("kick.wav"), &[0.3; 50], 1, 44100).unwrap();
        fs::write(dir.path().join("notes.txt"), "not audio").unwrap();
        dir
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("pad_clean"), "pad");
        assert_eq!(base_name("pad_excited"), "pad");
        assert_eq!(base_name("kick"), "kick");
    }

    #[test]
    fn test_directory_list() {
        let dir = library_dir();
        let library = DirectoryLibrary::new(dir.path(), None).unwrap();
        assert_eq!(library.list_available(), vec!["kick", "pad"]);
    }

    #[test]
    fn test_directory_missing_root() {
        assert!(DirectoryLibrary::new("/nonexistent/library", None).is_err());
    }

    #[test]
    fn test_directory_load_pair() {
        let dir = library_dir();
        let library = DirectoryLibrary::new(dir.path(), None).unwrap();
        let pair = library.load_pair_by_name("pad").unwrap();
        assert!((pair.clean.channel(0)[0] - 0.1).abs() < 1e-6);
        assert!((pair.excited.channel(0)[0] - 0.2).abs() < 1e-6);

        assert!(matches!(
            library.load_pair_by_name("kick"),
            Err(SampleError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_load_single_and_cache() {
        let dir = library_dir();
        let library = DirectoryLibrary::new(dir.path(), None).unwrap();
        let first = library.load_by_name("kick").unwrap();
        let second = library.load_by_name("kick").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // A pair name loads its clean half
        let pad = library.load_by_name("pad").unwrap();
        assert_eq!(pad.name(), "pad");

        assert!(matches!(
            library.load_by_name("snare"),
            Err(SampleError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_transcodes_to_target_rate() {
        let dir = library_dir();
        let library = DirectoryLibrary::new(dir.path(), Some(48000)).unwrap();
        let kick = library.load_by_name("kick").unwrap();
        assert_eq!(kick.sample_rate(), 48000);
        assert_eq!(kick.frames(), (50.0_f64 * 48000.0 / 44100.0).ceil() as usize);
        assert!(library.total_memory_usage() > 0);
    }

    #[test]
    fn test_memory_library() {
        let library = MemoryLibrary::new();
        library.insert("solo", constant_sample("solo", 0.5, 10, 48000));
        library.insert_pair(
            "pair",
            SamplePair {
                clean: constant_sample("c", 0.1, 10, 48000),
                excited: constant_sample("e", 0.2, 10, 48000),
            },
        );

        assert_eq!(library.list_available(), vec!["pair", "solo"]);
        assert!(library.load_by_name("solo").is_ok());
        assert!(library.load_by_name("pair").is_ok());
        assert!(library.load_pair_by_name("pair").is_ok());
        assert!(library.load_pair_by_name("solo").is_err());
    }
}
