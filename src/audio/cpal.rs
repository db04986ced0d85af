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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, info, span, warn, Level};

use crate::audio::{BlockCompletion, DeviceError, DeviceInfo, DeviceSink, OutputFormat};

/// A sink backed by a cpal output device.
///
/// Submitted blocks are queued to the device callback, which copies them into
/// the hardware buffer and signals a completion as each one is used up. Block
/// buffers travel back to the sink once played, so steady-state submission
/// does not allocate.
pub struct Sink {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Blocks waiting for the device callback.
    block_tx: Option<Sender<Vec<i16>>>,
    /// Played blocks returned by the device callback.
    recycle_rx: Option<Receiver<Vec<i16>>>,
    /// Dropped to stop the output thread.
    shutdown_tx: Option<Sender<()>>,
    /// Owns the cpal stream, which may not leave the thread it was built on.
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Sink {
    /// Gets the output device with the given name, or the default output device
    /// of the default host when no name is given.
    pub fn get(name: Option<&str>) -> Result<Sink, DeviceError> {
        let (host_id, device) = match name {
            Some(name) => find_output_device(name)?,
            None => {
                let host = cpal::default_host();
                let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
                (host.id(), device)
            }
        };

        let name = device
            .name()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;
        let max_channels = max_output_channels(&device);

        Ok(Sink {
            name,
            max_channels,
            host_id,
            device,
            block_tx: None,
            recycle_rx: None,
            shutdown_tx: None,
            output_thread: None,
        })
    }

    /// Starts the output thread, which builds and plays the stream and then
    /// keeps it alive until shutdown. Returns once the stream is playing or
    /// has failed to start.
    fn start_output_thread(
        &mut self,
        format: &OutputFormat,
        completion: BlockCompletion,
    ) -> Result<(), DeviceError> {
        // The scheduler never has more than `capacity` blocks outstanding.
        let (block_tx, block_rx) = bounded::<Vec<i16>>(completion.capacity());
        let (recycle_tx, recycle_rx) = bounded::<Vec<i16>>(completion.capacity());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<Result<(), DeviceError>>(1);

        let config = cpal::StreamConfig {
            channels: format.channel_count,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let device = self.device.clone();
        let name = self.name.clone();

        let output_thread = thread::Builder::new()
            .name(format!("cpal output {}", name))
            .spawn(move || {
                let mut callback = create_block_callback(block_rx, recycle_tx, completion);
                let stream = device
                    .build_output_stream(
                        &config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| callback(data),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    )
                    .map_err(|e| DeviceError::StreamBuild(e.to_string()));

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = started_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = started_tx.send(Err(DeviceError::StreamPlay(e.to_string())));
                    return;
                }
                info!(device = name, "CPAL output stream started successfully");
                let _ = started_tx.send(Ok(()));

                // Blocks until the sink drops its end.
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!(device = name, "CPAL output stream stopped");
            })
            .map_err(|e| DeviceError::StreamBuild(e.to_string()))?;

        let started = started_rx
            .recv()
            .unwrap_or_else(|_| Err(DeviceError::StreamBuild("output thread exited".into())));
        if let Err(e) = started {
            let _ = output_thread.join();
            return Err(e);
        }

        self.block_tx = Some(block_tx);
        self.recycle_rx = Some(recycle_rx);
        self.shutdown_tx = Some(shutdown_tx);
        self.output_thread = Some(output_thread);
        Ok(())
    }
}

impl DeviceSink for Sink {
    fn open(
        &mut self,
        format: &OutputFormat,
        completion: BlockCompletion,
    ) -> Result<(), DeviceError> {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        if self.output_thread.is_some() {
            return Err(DeviceError::UnsupportedConfig(format!(
                "{} is already open",
                self.name
            )));
        }
        if format.channel_count > self.max_channels {
            return Err(DeviceError::UnsupportedConfig(format!(
                "{} channels requested, audio device {} only has {}",
                format.channel_count, self.name, self.max_channels
            )));
        }

        self.start_output_thread(format, completion)?;
        info!(device = self.name, format = %format, "Opened device.");
        Ok(())
    }

    fn submit(&mut self, block: &[i16]) -> Result<(), DeviceError> {
        let block_tx = self.block_tx.as_ref().ok_or(DeviceError::NotOpen)?;

        let mut buffer = self
            .recycle_rx
            .as_ref()
            .and_then(|rx| rx.try_recv().ok())
            .unwrap_or_default();
        buffer.clear();
        buffer.extend_from_slice(block);

        queue_block(block_tx, buffer)
    }

    fn close(&mut self) {
        self.block_tx = None;
        self.recycle_rx = None;
        self.shutdown_tx = None;
        if let Some(output_thread) = self.output_thread.take() {
            if output_thread.join().is_err() {
                warn!(device = self.name, "CPAL output thread panicked");
            }
            info!(device = self.name, "Closed device.");
        }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds the device callback. It copies queued blocks into the device
/// buffer, signals one completion per block used up and zero-fills whatever
/// the queue can't cover.
fn create_block_callback(
    block_rx: Receiver<Vec<i16>>,
    recycle_tx: Sender<Vec<i16>>,
    completion: BlockCompletion,
) -> impl FnMut(&mut [i16]) + Send + 'static {
    let mut current: Option<Vec<i16>> = None;
    let mut offset = 0;

    move |data: &mut [i16]| {
        let mut written = 0;
        while written < data.len() {
            if current.is_none() {
                match block_rx.try_recv() {
                    Ok(block) => {
                        current = Some(block);
                        offset = 0;
                    }
                    Err(_) => break,
                }
            }
            let Some(block) = current.as_ref() else {
                break;
            };

            let count = (block.len() - offset).min(data.len() - written);
            data[written..written + count].copy_from_slice(&block[offset..offset + count]);
            written += count;
            offset += count;

            if offset >= block.len() {
                if let Some(block) = current.take() {
                    let _ = recycle_tx.try_send(block);
                }
                completion.signal();
            }
        }

        // Zero-fill any shortfall
        data[written..].fill(0);
    }
}

fn max_output_channels(device: &cpal::Device) -> u16 {
    device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

fn max_input_channels(device: &cpal::Device) -> u16 {
    device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

fn find_output_device(name: &str) -> Result<(cpal::HostId, cpal::Device), DeviceError> {
    let _shh_stdout = shh::stdout().map_err(|e| DeviceError::Enumeration(e.to_string()))?;
    let _shh_stderr = shh::stderr().map_err(|e| DeviceError::Enumeration(e.to_string()))?;

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        let Ok(devices) = host.output_devices() else {
            continue;
        };
        for device in devices {
            if device.name().map(|n| n.trim() == name).unwrap_or(false) {
                return Ok((host_id, device));
            }
        }
    }

    Err(DeviceError::DeviceNotFound(name.to_string()))
}

/// Lists every device that can play audio.
pub fn list_output_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    list_cpal_devices(max_output_channels)
}

/// Lists every device that can record audio.
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    list_cpal_devices(max_input_channels)
}

fn list_cpal_devices(
    max_channels: fn(&cpal::Device) -> u16,
) -> Result<Vec<DeviceInfo>, DeviceError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout().map_err(|e| DeviceError::Enumeration(e.to_string()))?;
    let _shh_stderr = shh::stderr().map_err(|e| DeviceError::Enumeration(e.to_string()))?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = cpal::host_from_id(host_id)
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;
        let host_devices = match host.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let channels = max_channels(&device);
            if channels == 0 {
                continue;
            }
            let Ok(name) = device.name() else {
                continue;
            };

            // cpal does not expose vendor identifiers.
            devices.push(DeviceInfo {
                name,
                host: host_id.name().to_string(),
                max_channels: channels,
                product_id: None,
                manufacturer_id: None,
                driver_version: None,
            });
        }
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Hands a block to the output callback without blocking the render thread.
fn queue_block(block_tx: &Sender<Vec<i16>>, block: Vec<i16>) -> Result<(), DeviceError> {
    block_tx.try_send(block).map_err(|e| match e {
        TrySendError::Full(_) => DeviceError::QueueFull(block_tx.capacity().unwrap_or_default()),
        TrySendError::Disconnected(_) => DeviceError::Closed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::FreeBlocks;

    #[test]
    fn test_callback_spans_blocks() {
        let free_blocks = Arc::new(FreeBlocks::new(4));
        let (block_tx, block_rx) = bounded(4);
        let (recycle_tx, recycle_rx) = bounded(4);
        let mut callback = create_block_callback(
            block_rx,
            recycle_tx,
            BlockCompletion::new(free_blocks.clone()),
        );

        block_tx.send(vec![1, 2, 3]).unwrap();
        block_tx.send(vec![4, 5, 6]).unwrap();

        let mut data = [0i16; 4];
        callback(&mut data);
        assert_eq!(data, [1, 2, 3, 4]);
        assert_eq!(recycle_rx.try_iter().count(), 1);

        // The second block finishes partway through, then the rest underruns.
        let mut data = [9i16; 4];
        callback(&mut data);
        assert_eq!(data, [5, 6, 0, 0]);
        assert_eq!(recycle_rx.try_iter().count(), 1);
    }

    #[test]
    fn test_callback_signals_completions() {
        let free_blocks = Arc::new(FreeBlocks::new(2));
        let (block_tx, block_rx) = bounded(4);
        let (recycle_tx, _recycle_rx) = bounded(4);
        let mut callback = create_block_callback(
            block_rx,
            recycle_tx,
            BlockCompletion::new(free_blocks.clone()),
        );

        // Take both blocks as if the render thread had filled them.
        assert!(free_blocks.claim());
        assert!(free_blocks.claim());
        block_tx.send(vec![1; 2]).unwrap();
        block_tx.send(vec![2; 2]).unwrap();

        let mut data = [0i16; 2];
        callback(&mut data);
        assert_eq!(data, [1, 1]);
        assert_eq!(free_blocks.available(), 1);
        callback(&mut data);
        assert_eq!(data, [2, 2]);
        assert_eq!(free_blocks.available(), 2);
    }

    #[test]
    fn test_queue_holds_at_most_capacity() {
        let (block_tx, block_rx) = bounded(2);
        queue_block(&block_tx, vec![1]).unwrap();
        queue_block(&block_tx, vec![2]).unwrap();
        assert!(matches!(
            queue_block(&block_tx, vec![3]),
            Err(DeviceError::QueueFull(2))
        ));

        assert_eq!(block_rx.recv().unwrap(), vec![1]);
        queue_block(&block_tx, vec![3]).unwrap();

        drop(block_rx);
        assert!(matches!(
            queue_block(&block_tx, vec![4]),
            Err(DeviceError::Closed)
        ));
    }

    #[test]
    fn test_callback_silence_without_blocks() {
        let free_blocks = Arc::new(FreeBlocks::new(1));
        let (_block_tx, block_rx) = bounded::<Vec<i16>>(1);
        let (recycle_tx, _recycle_rx) = bounded(4);
        let mut callback =
            create_block_callback(block_rx, recycle_tx, BlockCompletion::new(free_blocks));

        let mut data = [7i16; 8];
        callback(&mut data);
        assert_eq!(data, [0; 8]);
    }
}
