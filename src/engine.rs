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

//! The engine ties the clip store, the render thread and a device sink
//! together.
//!
//! Callers never touch the mixer directly. Every mutation is sent as a
//! [`Command`] and applied by the render thread at the next block boundary,
//! so mixing runs without locks.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::audio::thread_priority::{
    configure_render_thread_priority, render_thread_priority, rt_audio_enabled,
};
use crate::audio::{
    self, BlockCompletion, BufferScheduler, DeviceError, DeviceSink, Filter, FreeBlocks,
    Generator, Mixer, OutputFormat, RenderStatus,
};
use crate::config::{ConfigError, EngineConfig};
use crate::samples::{AudioClip, ClipId, LoadError, SampleStore};

/// Error types for the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Unknown clip: {0}")]
    UnknownClip(ClipId),

    #[error("Too many active playbacks (limit {0})")]
    TooManyPlaybacks(usize),

    #[error("Engine is stopped")]
    Stopped,

    #[error("Unable to spawn render thread: {0}")]
    Spawn(std::io::Error),
}

/// A change to apply to the mixer at the next block boundary.
pub enum Command {
    /// Start a new instance of a clip. The clip is resolved by the caller so
    /// the render thread never looks anything up.
    Play {
        clip_id: ClipId,
        clip: Arc<AudioClip>,
        looping: bool,
    },
    /// Stop every instance of a clip.
    Stop(ClipId),
    /// Stop every instance of every clip.
    StopAll,
    SetGenerator(Box<dyn Generator>),
    ClearGenerator,
    SetFilter(Box<dyn Filter>),
    ClearFilter,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Play {
                clip_id, looping, ..
            } => f
                .debug_struct("Play")
                .field("clip_id", clip_id)
                .field("looping", looping)
                .finish(),
            Command::Stop(clip_id) => f.debug_tuple("Stop").field(clip_id).finish(),
            Command::StopAll => f.write_str("StopAll"),
            Command::SetGenerator(_) => f.write_str("SetGenerator"),
            Command::ClearGenerator => f.write_str("ClearGenerator"),
            Command::SetFilter(_) => f.write_str("SetFilter"),
            Command::ClearFilter => f.write_str("ClearFilter"),
        }
    }
}

/// Applies a command to the mixer. Runs on the render thread. Playback slots
/// freed by the command are returned to `status`.
fn apply_command(mixer: &mut Mixer, status: &RenderStatus, command: Command) {
    debug!(command = ?command, "Applying command");
    match command {
        Command::Play {
            clip_id,
            clip,
            looping,
        } => {
            if let Err(e) = mixer.play(clip_id, clip, looping) {
                warn!(clip = %clip_id, err = %e, "Dropping play command");
                status.release_playbacks(1);
            }
        }
        Command::Stop(clip_id) => status.release_playbacks(mixer.stop(clip_id)),
        Command::StopAll => status.release_playbacks(mixer.stop_all()),
        Command::SetGenerator(generator) => mixer.set_generator(generator),
        Command::ClearGenerator => mixer.clear_generator(),
        Command::SetFilter(filter) => mixer.set_filter(filter),
        Command::ClearFilter => mixer.clear_filter(),
    }
}

fn drain_commands(mixer: &mut Mixer, status: &RenderStatus, command_rx: &Receiver<Command>) {
    while let Ok(command) = command_rx.try_recv() {
        apply_command(mixer, status, command);
    }
}

/// A running render engine.
pub struct Engine {
    format: OutputFormat,
    device: String,
    samples: SampleStore,
    command_tx: Sender<Command>,
    active: Arc<AtomicBool>,
    free_blocks: Arc<FreeBlocks>,
    status: Arc<RenderStatus>,
    render_thread: Option<thread::JoinHandle<()>>,
}

impl Engine {
    /// Opens the device named in the configuration (or the default device)
    /// and starts rendering to it.
    pub fn open(config: &EngineConfig) -> Result<Engine, EngineError> {
        config.validate()?;
        let sink = audio::get_sink(config.device())?;
        Engine::start(config, sink)
    }

    /// Opens the sink and starts the render thread. If the sink cannot be
    /// opened no thread is started.
    pub fn start(
        config: &EngineConfig,
        mut sink: Box<dyn DeviceSink>,
    ) -> Result<Engine, EngineError> {
        config.validate()?;
        let format = OutputFormat::new(config.sample_rate(), config.channel_count())?;
        let block_count = config.block_count();
        let block_samples = config.block_sample_count();
        let max_playbacks = config.max_playbacks();

        let free_blocks = Arc::new(FreeBlocks::new(block_count));
        sink.open(&format, BlockCompletion::new(free_blocks.clone()))?;
        let device = sink.to_string();

        let status = Arc::new(RenderStatus::new(max_playbacks));
        let mut scheduler = BufferScheduler::new(
            &format,
            block_count,
            block_samples,
            Mixer::new(max_playbacks),
            sink,
            free_blocks.clone(),
            status.clone(),
        );

        let (command_tx, command_rx) = crossbeam_channel::unbounded::<Command>();
        let active = Arc::new(AtomicBool::new(true));

        // Read once here rather than on the render thread.
        let priority = render_thread_priority();
        let rt_audio = rt_audio_enabled();

        let render_thread = {
            let active = active.clone();
            let status = status.clone();
            thread::Builder::new()
                .name("blockmix render".into())
                .spawn(move || {
                    configure_render_thread_priority(priority, rt_audio);
                    scheduler.run(&active, |mixer| {
                        drain_commands(mixer, &status, &command_rx)
                    });
                })
                .map_err(EngineError::Spawn)?
        };

        info!(
            device = %device,
            format = %format,
            blocks = block_count,
            block_samples,
            max_playbacks,
            "Engine started"
        );

        Ok(Engine {
            format,
            device,
            samples: SampleStore::new(),
            command_tx,
            active,
            free_blocks,
            status,
            render_thread: Some(render_thread),
        })
    }

    /// Decodes a WAV file into the clip store.
    pub fn load_clip(&self, path: &Path) -> Result<ClipId, EngineError> {
        Ok(self.samples.load(path)?)
    }

    /// Decodes a WAV stream into the clip store.
    pub fn load_clip_from_reader<R: Read>(&self, reader: R) -> Result<ClipId, EngineError> {
        Ok(self.samples.load_reader(reader)?)
    }

    /// Returns the clip with the given id, if it has been loaded.
    pub fn clip(&self, clip_id: ClipId) -> Option<Arc<AudioClip>> {
        self.samples.get(clip_id)
    }

    pub fn clip_count(&self) -> usize {
        self.samples.len()
    }

    /// Starts playing a clip from the beginning at the next block boundary.
    ///
    /// A slot is reserved before the command is queued, so plays issued
    /// between two blocks are counted against the limit too.
    pub fn play(&self, clip_id: ClipId, looping: bool) -> Result<(), EngineError> {
        let clip = self
            .samples
            .get(clip_id)
            .ok_or(EngineError::UnknownClip(clip_id))?;
        if !self.status.reserve_playback() {
            return Err(EngineError::TooManyPlaybacks(self.status.max_playbacks()));
        }

        debug!(clip = %clip_id, looping, "Play");
        let result = self.send(Command::Play {
            clip_id,
            clip,
            looping,
        });
        if result.is_err() {
            self.status.release_playbacks(1);
        }
        result
    }

    /// Stops every instance of a clip. Stopping a clip that isn't playing,
    /// or was never loaded, does nothing.
    pub fn stop(&self, clip_id: ClipId) -> Result<(), EngineError> {
        debug!(clip = %clip_id, "Stop");
        self.send(Command::Stop(clip_id))
    }

    pub fn stop_all(&self) -> Result<(), EngineError> {
        self.send(Command::StopAll)
    }

    /// Registers a generator whose output is added to every channel after the
    /// clips. Replaces any previous generator.
    pub fn set_generator<G>(&self, generator: G) -> Result<(), EngineError>
    where
        G: Generator + 'static,
    {
        self.send(Command::SetGenerator(Box::new(generator)))
    }

    pub fn clear_generator(&self) -> Result<(), EngineError> {
        self.send(Command::ClearGenerator)
    }

    /// Registers a filter whose output replaces the mixed sample of every
    /// channel. Replaces any previous filter.
    pub fn set_filter<F>(&self, filter: F) -> Result<(), EngineError>
    where
        F: Filter + 'static,
    {
        self.send(Command::SetFilter(Box::new(filter)))
    }

    pub fn clear_filter(&self) -> Result<(), EngineError> {
        self.send(Command::ClearFilter)
    }

    /// Elapsed global time in seconds, as of the last rendered block.
    pub fn time(&self) -> f64 {
        self.status.time()
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.status.blocks_rendered()
    }

    /// Number of playing clip instances, as of the last rendered block.
    pub fn active_playbacks(&self) -> usize {
        self.status.active_playbacks()
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns true while the render thread is running.
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
            && self
                .render_thread
                .as_ref()
                .is_some_and(|t| !t.is_finished())
    }

    /// Stops the render thread and closes the device. Waits for the thread to
    /// exit.
    pub fn shutdown(&mut self) {
        let Some(render_thread) = self.render_thread.take() else {
            return;
        };

        self.active.store(false, Ordering::Release);
        self.free_blocks.wake_all();
        if render_thread.join().is_err() {
            warn!("Render thread panicked");
        }

        info!(
            blocks_rendered = self.status.blocks_rendered(),
            time = self.status.time(),
            "Engine stopped"
        );
    }

    fn send(&self, command: Command) -> Result<(), EngineError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        self.command_tx
            .send(command)
            .map_err(|_| EngineError::Stopped)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("device", &self.device)
            .field("format", &self.format)
            .field("clips", &self.samples.len())
            .field("blocks_rendered", &self.status.blocks_rendered())
            .finish()
    }
}
