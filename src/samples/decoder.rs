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

//! Decodes audio files (WAV, FLAC, MP3, etc.) into in-memory samples.
//!
//! This is the only place that knows about container formats. Anything that
//! can hand over plain bytes, including assets that were decrypted or
//! unpacked elsewhere, goes through [`decode_bytes`].

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::error::SampleError;
use super::sample::Sample;

/// Decodes an audio file into a sample named `name`.
pub fn decode_file(path: &Path, name: &str) -> Result<Sample, SampleError> {
    // Include the path in the error so the user sees which file failed
    let file = File::open(path).map_err(|e| {
        SampleError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    decode_source(Box::new(file), hint, name)
}

/// Decodes an in-memory encoded audio file. `extension` is an optional
/// format hint such as "wav".
pub fn decode_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    name: &str,
) -> Result<Sample, SampleError> {
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }
    decode_source(Box::new(Cursor::new(bytes)), hint, name)
}

fn decode_source(
    source: Box<dyn MediaSource>,
    hint: Hint,
    name: &str,
) -> Result<Sample, SampleError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| SampleError::DecodeFailed(name.to_string(), e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            SampleError::DecodeFailed(name.to_string(), "No audio track found".to_string())
        })?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate = params.sample_rate.ok_or_else(|| {
        SampleError::DecodeFailed(name.to_string(), "Sample rate not specified".to_string())
    })?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| SampleError::DecodeFailed(name.to_string(), e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut channels = params.channels.map(|c| c.count()).unwrap_or(0);
    let mut buffer: Option<SampleBuffer<f32>> = None;
    let mut buffer_frames = 0u64;
    let mut buffer_spec = None;

    while let Some(packet) = next_packet(format_reader.as_mut(), decoder.as_mut(), track_id)? {
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet is skipped rather than failing the whole sample
                debug!(sample = name, error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(SampleError::AudioError(e)),
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        if channels == 0 {
            channels = spec.channels.count();
        }

        // Reuse the conversion buffer until a packet outgrows it
        if buffer_frames < capacity || buffer_spec != Some(spec) {
            buffer = Some(SampleBuffer::new(capacity, spec));
            buffer_frames = capacity;
            buffer_spec = Some(spec);
        }
        if let Some(sample_buffer) = buffer.as_mut() {
            sample_buffer.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(sample_buffer.samples());
        }
    }

    if channels == 0 {
        return Err(SampleError::DecodeFailed(
            name.to_string(),
            "Channels not specified".to_string(),
        ));
    }

    Sample::from_interleaved(name, &interleaved, channels as u16, sample_rate)
}

/// Reads the next packet belonging to `track_id`. Returns `Ok(None)` at end of
/// stream. ResetRequired resets the decoder and continues reading.
fn next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Option<Packet>, SampleError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
            Ok(_) => continue,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            // Some readers return DecodeError at EOF instead of IoError
            Err(SymphoniaError::DecodeError(_)) => return Ok(None),
            Err(e) => return Err(SampleError::AudioError(e)),
        }
    }
}
