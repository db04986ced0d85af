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
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use blockmix::audio;
use blockmix::config::{self, EngineConfig};
use blockmix::samples;
use blockmix::Engine;
use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing_subscriber::EnvFilter;

const DEFAULT_TONE_DURATION: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A block-scheduled PCM mixing engine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output and input devices.
    Devices {},
    /// Prints the decoded format of a WAV file.
    Info {
        /// The path to the WAV file.
        path: PathBuf,
    },
    /// Plays a WAV file through the audio interface.
    Play {
        /// The path to the WAV file.
        path: PathBuf,
        /// Loop the clip until the duration elapses.
        #[arg(short, long = "loop")]
        looping: bool,
        /// How long to play for, e.g. 5s. Defaults to the length of the clip.
        #[arg(short, long)]
        duration: Option<String>,
        /// The engine config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config file.
        #[arg(long)]
        device: Option<String>,
    },
    /// Plays a sine tone through the audio interface.
    Tone {
        /// The frequency of the tone in Hz.
        frequency: f64,
        /// The amplitude of the tone, between 0 and 1.
        #[arg(short, long, default_value_t = 0.25)]
        amplitude: f64,
        /// How long to play for, e.g. 5s.
        #[arg(short, long)]
        duration: Option<String>,
        /// The engine config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config file.
        #[arg(long)]
        device: Option<String>,
    },
}

fn engine_config(
    path: Option<&Path>,
    device: Option<&str>,
) -> Result<EngineConfig, Box<dyn Error>> {
    let engine_config = match path {
        Some(path) => config::load(path)?,
        None => EngineConfig::new(),
    };
    Ok(match device {
        Some(device) => engine_config.with_device(device),
        None => engine_config,
    })
}

fn parse_duration(duration: Option<String>) -> Result<Option<Duration>, Box<dyn Error>> {
    match duration {
        Some(duration) => Ok(Some(DurationString::from_string(duration)?.into())),
        None => Ok(None),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let outputs = audio::list_devices()?;
            let inputs = audio::list_input_devices()?;

            if outputs.is_empty() && inputs.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Output devices:");
            for device in outputs {
                println!("- {}", device);
            }
            println!("\nInput devices:");
            for device in inputs {
                println!("- {}", device);
            }
        }
        Commands::Info { path } => {
            let clip = samples::decode_file(&path)?;
            println!("{}:", path.display());
            println!("- Channels: {}", clip.channel_count());
            println!("- Sample rate: {}Hz", clip.sample_rate());
            println!("- Frames: {}", clip.frames());
            println!("- Duration: {:?}", clip.duration());
            println!("- Memory: {}KB", clip.memory_size() / 1024);
        }
        Commands::Play {
            path,
            looping,
            duration,
            config,
            device,
        } => {
            let duration = parse_duration(duration)?;
            let engine = Engine::open(&engine_config(config.as_deref(), device.as_deref())?)?;
            let clip_id = engine.load_clip(&path)?;
            engine.play(clip_id, looping)?;
            println!("Playing {} on {}", path.display(), engine.device());

            match duration {
                Some(duration) => thread::sleep(duration),
                None if looping => loop {
                    thread::sleep(Duration::from_secs(1));
                },
                None => wait_for_playbacks(&engine),
            }
        }
        Commands::Tone {
            frequency,
            amplitude,
            duration,
            config,
            device,
        } => {
            let duration = parse_duration(duration)?.unwrap_or(DEFAULT_TONE_DURATION);
            let engine = Engine::open(&engine_config(config.as_deref(), device.as_deref())?)?;
            engine.set_generator(move |_: usize, time: f64, _: f64| {
                amplitude * (TAU * frequency * time).sin()
            })?;
            println!("Playing {}Hz on {}", frequency, engine.device());
            thread::sleep(duration);
        }
    }

    Ok(())
}

/// Waits until the engine has picked up the play command and every instance
/// has finished.
fn wait_for_playbacks(engine: &Engine) {
    let start = Instant::now();
    let mut started = false;
    while engine.is_running() {
        let active = engine.active_playbacks();
        if active > 0 {
            started = true;
        } else if started || start.elapsed() > Duration::from_secs(1) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
