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
use std::fmt;

#[cfg(feature = "device")]
pub mod cpal;
pub mod format;
pub mod mixer;
pub mod mock;
pub mod scheduler;
pub mod thread_priority;

pub use format::OutputFormat;
pub use mixer::{Filter, Generator, Mixer};
pub use scheduler::{BlockCompletion, BufferScheduler, FreeBlocks, RenderStatus};

/// Error types for output devices
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Unsupported device configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Unable to list audio devices: {0}")]
    Enumeration(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlay(String),

    #[error("Device is not open")]
    NotOpen,

    #[error("Device is closed")]
    Closed,

    #[error("Device queue is full ({0} blocks)")]
    QueueFull(usize),
}

/// An output device that plays blocks of interleaved 16-bit samples.
///
/// Submission is asynchronous: `submit` returns as soon as the block has been
/// queued, and the device later reports the block as played through the
/// [`BlockCompletion`] it was opened with.
pub trait DeviceSink: fmt::Display + Send {
    /// Opens the device with the given format. Completions for every block
    /// submitted afterwards are reported through `completion`.
    fn open(&mut self, format: &OutputFormat, completion: BlockCompletion)
        -> Result<(), DeviceError>;

    /// Queues a block for playback. The sink copies what it needs, so the
    /// caller may reuse the buffer once the block's completion has arrived.
    fn submit(&mut self, block: &[i16]) -> Result<(), DeviceError>;

    /// Stops accepting blocks. Blocks still queued may be dropped without a
    /// completion.
    fn close(&mut self);
}

/// Describes an audio device known to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// The display name of the device.
    pub name: String,
    /// The name of the host API the device belongs to.
    pub host: String,
    /// The maximum number of channels the device supports.
    pub max_channels: u16,
    /// Product identifier, if the host reports one.
    pub product_id: Option<u32>,
    /// Manufacturer identifier, if the host reports one.
    pub manufacturer_id: Option<u32>,
    /// Driver version, if the host reports one.
    pub driver_version: Option<u32>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )?;
        if let Some(product_id) = self.product_id {
            write!(f, " (Product={})", product_id)?;
        }
        if let Some(manufacturer_id) = self.manufacturer_id {
            write!(f, " (Manufacturer={})", manufacturer_id)?;
        }
        if let Some(driver_version) = self.driver_version {
            write!(f, " (Driver={})", driver_version)?;
        }
        Ok(())
    }
}

/// Lists output devices known to the host.
#[cfg(feature = "device")]
pub fn list_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    cpal::list_output_devices()
}

/// Lists input devices known to the host.
#[cfg(feature = "device")]
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    cpal::list_input_devices()
}

#[cfg(not(feature = "device"))]
pub fn list_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    Ok(Vec::new())
}

#[cfg(not(feature = "device"))]
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    Ok(Vec::new())
}

/// Gets a sink for the device with the given name, or the host's default
/// output device when no name is given. Names starting with "mock" produce a
/// mock sink that plays blocks back in real time without touching hardware.
pub fn get_sink(device: Option<&str>) -> Result<Box<dyn DeviceSink>, DeviceError> {
    if let Some(name) = device {
        if name.starts_with("mock") {
            return Ok(Box::new(mock::Sink::real_time(name)));
        }
    }

    #[cfg(feature = "device")]
    {
        Ok(Box::new(cpal::Sink::get(device)?))
    }

    #[cfg(not(feature = "device"))]
    {
        Err(DeviceError::DeviceNotFound(
            device.unwrap_or("default").to_string(),
        ))
    }
}
