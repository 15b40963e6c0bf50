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

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use clap::{crate_version, Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;
use tracing_subscriber::EnvFilter;

use duosampler::config::RenderJob;
use duosampler::engine::{create, Engine, MidiEvent};
use duosampler::params::ParameterId;
use duosampler::samples::{DirectoryLibrary, SoundLibrary};
use duosampler::voices::Group;
use duosampler::Plugin;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A dual clean/excited sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the sounds in a sound library directory.
    Sounds {
        /// The path to the sound library.
        path: PathBuf,
    },
    /// Lists every parameter with its range and default.
    Params {},
    /// Renders a note through the engine into a WAV file.
    Render {
        /// The path to the render job YAML.
        job_path: PathBuf,
        /// Where to write the rendered WAV file.
        output_path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sounds { path } => {
            let library = DirectoryLibrary::new(&path, None)?;
            let sounds = library.list_available();
            if sounds.is_empty() {
                println!("No sounds found in {}.", path.display());
                return Ok(());
            }

            println!("Sounds (count: {}):", sounds.len());
            for sound in sounds {
                let kind = if library.load_pair_by_name(&sound).is_ok() {
                    "clean/excited"
                } else {
                    "single"
                };
                println!("- {} ({})", sound, kind);
            }
        }
        Commands::Params {} => {
            println!("Parameters:");
            for id in ParameterId::ALL {
                let range = id.range();
                println!(
                    "- {}: {} to {} (default {})",
                    id, range.min, range.max, range.default
                );
            }
        }
        Commands::Render {
            job_path,
            output_path,
        } => render(&job_path, &output_path)?,
    }

    Ok(())
}

/// Renders a job through a prepared engine on its own thread, with the
/// control side driven from this one.
fn render(job_path: &Path, output_path: &Path) -> Result<(), Box<dyn Error>> {
    let job = RenderJob::deserialize(job_path)?;
    let config = job.engine();
    let spec = config.process_spec();

    let library = DirectoryLibrary::new(job.library(), Some(config.sample_rate()))?;
    let (mut engine, controller) = create(config, Arc::new(library))?;
    engine.prepare(spec)?;

    controller.load_sound(Group::One, job.sound1())?;
    if let Some(sound2) = job.sound2() {
        controller.load_sound(Group::Two, sound2)?;
    }
    if let Some(mix) = job.mix() {
        controller.set_parameter(ParameterId::Mix, mix);
    }
    if let Some(settings) = job.loop_settings() {
        let start_ms = settings.start()?.map(|d| d.as_secs_f64() * 1000.0).unwrap_or(0.0);
        let end_ms = settings
            .end()?
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or_else(|| controller.audio_length_ms());
        let range = controller.set_loop_points_ms(start_ms, end_ms);
        controller.set_loop_enabled(true);
        info!(%range, "Looping");
    }

    let hold_frames = spec.ms_to_samples(job.hold()?.as_secs_f64() * 1000.0) as usize;
    let tail_frames = spec.ms_to_samples(job.tail()?.as_secs_f64() * 1000.0) as usize;

    let mut channels = vec![Vec::with_capacity(hold_frames + tail_frames); spec.num_channels];
    let note_on = [MidiEvent::note_on(0, job.note(), job.velocity())];
    render_frames(&mut engine, &mut channels, hold_frames, spec.max_block_size, &note_on)?;

    // The note-off is swallowed while looping, so end the loop explicitly
    if controller.is_looping() {
        controller.stop_playback();
    }
    let note_off = [MidiEvent::note_off(0, job.note())];
    render_frames(&mut engine, &mut channels, tail_frames, spec.max_block_size, &note_off)?;
    controller.collect_garbage();

    write_wav(output_path, &channels, spec.sample_rate)?;
    info!(
        path = ?output_path,
        frames = hold_frames + tail_frames,
        dropped_events = controller.dropped_events(),
        "Render complete"
    );
    Ok(())
}

/// Runs the engine for `frames` on an audio thread, appending the output to
/// `channels`. `events` are sent with the first block.
fn render_frames(
    engine: &mut Engine,
    channels: &mut [Vec<f32>],
    frames: usize,
    block_size: usize,
    events: &[MidiEvent],
) -> Result<(), Box<dyn Error>> {
    thread::scope(|scope| {
        scope
            .spawn(|| {
                let mut block = vec![vec![0.0f32; block_size]; channels.len()];
                let mut rendered = 0;
                while rendered < frames {
                    let len = block_size.min(frames - rendered);
                    let mut outputs: Vec<&mut [f32]> =
                        block.iter_mut().map(|c| &mut c[..len]).collect();
                    let block_events: &[MidiEvent] = if rendered == 0 { events } else { &[] };
                    engine.process(&mut outputs, block_events);
                    for (channel, output) in channels.iter_mut().zip(outputs.iter()) {
                        channel.extend_from_slice(output);
                    }
                    rendered += len;
                }
            })
            .join()
    })
    .map_err(|_| "Audio thread panicked".into())
}

fn write_wav(path: &Path, channels: &[Vec<f32>], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}
