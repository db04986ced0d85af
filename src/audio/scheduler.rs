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

//! Block ring and render loop.
//!
//! The render thread fills one block at a time and hands it to a
//! [`DeviceSink`]. The sink reports each finished block through a
//! [`BlockCompletion`], which is the only state shared with the device: an
//! atomic free-block count plus a condvar the render thread sleeps on while no
//! block is free.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{error, info, span, trace, warn, Level};

use crate::audio::format::{to_output_sample, OutputFormat};
use crate::audio::mixer::Mixer;
use crate::audio::{DeviceError, DeviceSink};

/// Counts blocks that may be rendered without overwriting audio the device
/// has not played yet.
pub struct FreeBlocks {
    /// Number of free blocks, always within [0, capacity].
    count: AtomicUsize,
    capacity: usize,
    lock: Mutex<()>,
    block_freed: Condvar,
}

impl FreeBlocks {
    /// Creates a counter with every block free.
    pub fn new(capacity: usize) -> Self {
        Self {
            count: AtomicUsize::new(capacity),
            capacity,
            lock: Mutex::new(()),
            block_freed: Condvar::new(),
        }
    }

    pub fn available(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Marks one block as free and wakes the render thread. Returns false if
    /// every block was already free, in which case the signal is ignored.
    fn release(&self) -> bool {
        let released = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();

        let _guard = self.lock.lock();
        self.block_freed.notify_one();
        released
    }

    /// Claims one free block. Returns false if none is free.
    pub(crate) fn claim(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Blocks until a block is free or `active` is cleared. Returns true if a
    /// block is free and the loop should keep going.
    fn wait(&self, active: &AtomicBool) -> bool {
        if self.available() == 0 {
            let mut guard = self.lock.lock();
            while self.available() == 0 && active.load(Ordering::Acquire) {
                self.block_freed.wait(&mut guard);
            }
        }
        active.load(Ordering::Acquire) && self.available() > 0
    }

    /// Wakes every waiter so it can observe a cleared `active` flag.
    pub fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.block_freed.notify_all();
    }
}

/// Handed to a device sink when it is opened. The sink calls [`signal`] once
/// for every block it has finished playing, from whatever thread it likes.
///
/// [`signal`]: BlockCompletion::signal
#[derive(Clone)]
pub struct BlockCompletion {
    free_blocks: Arc<FreeBlocks>,
}

impl BlockCompletion {
    pub fn new(free_blocks: Arc<FreeBlocks>) -> Self {
        Self { free_blocks }
    }

    /// The most blocks that can be outstanding at once.
    pub fn capacity(&self) -> usize {
        self.free_blocks.capacity()
    }

    /// Reports that one submitted block has finished playing.
    pub fn signal(&self) {
        if !self.free_blocks.release() {
            warn!("Block completion signalled with no block outstanding");
        }
    }
}

/// Render progress published for other threads. Written only by the render
/// thread, apart from playback slots which callers reserve.
#[derive(Debug)]
pub struct RenderStatus {
    /// Global time in seconds, stored as f64 bits.
    time: AtomicU64,
    blocks_rendered: AtomicU64,
    active_playbacks: AtomicUsize,
    /// Playbacks accepted from callers and not yet stopped or finished.
    reserved_playbacks: AtomicUsize,
    max_playbacks: usize,
}

impl RenderStatus {
    pub fn new(max_playbacks: usize) -> Self {
        Self {
            time: AtomicU64::new(0),
            blocks_rendered: AtomicU64::new(0),
            active_playbacks: AtomicUsize::new(0),
            reserved_playbacks: AtomicUsize::new(0),
            max_playbacks,
        }
    }

    /// Elapsed global time in seconds.
    pub fn time(&self) -> f64 {
        f64::from_bits(self.time.load(Ordering::Relaxed))
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Acquire)
    }

    pub fn active_playbacks(&self) -> usize {
        self.active_playbacks.load(Ordering::Relaxed)
    }

    fn set_time(&self, time: f64) {
        self.time.store(time.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_active_playbacks(&self, count: usize) {
        self.active_playbacks.store(count, Ordering::Relaxed);
    }

    /// Claims a playback slot. Returns false if every slot is taken.
    pub fn reserve_playback(&self) -> bool {
        self.reserved_playbacks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_playbacks).then_some(n + 1)
            })
            .is_ok()
    }

    /// Returns slots for playbacks that stopped, finished or were never
    /// started.
    pub fn release_playbacks(&self, count: usize) {
        if count == 0 {
            return;
        }
        // Instances played straight into a mixer never reserved a slot.
        let _ = self
            .reserved_playbacks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(count))
            });
    }

    pub fn reserved_playbacks(&self) -> usize {
        self.reserved_playbacks.load(Ordering::Acquire)
    }

    pub fn max_playbacks(&self) -> usize {
        self.max_playbacks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// May become the next render target.
    Free,
    /// Being filled by the render loop.
    Rendering,
    /// Owned by the device until its completion arrives.
    Submitted,
}

struct Block {
    samples: Vec<i16>,
    state: BlockState,
}

/// Owns the block ring and drives the mixer one block at a time.
pub struct BufferScheduler {
    blocks: Vec<Block>,
    /// Ring index of the next block to render.
    current: usize,
    channel_count: usize,
    time: f64,
    time_step: f64,
    mixer: Mixer,
    sink: Box<dyn DeviceSink>,
    free_blocks: Arc<FreeBlocks>,
    status: Arc<RenderStatus>,
}

impl BufferScheduler {
    /// Creates a scheduler with `block_count` blocks of `block_samples`
    /// interleaved samples each. The sink must already be open and wired to
    /// `free_blocks`.
    pub fn new(
        format: &OutputFormat,
        block_count: usize,
        block_samples: usize,
        mixer: Mixer,
        sink: Box<dyn DeviceSink>,
        free_blocks: Arc<FreeBlocks>,
        status: Arc<RenderStatus>,
    ) -> Self {
        let blocks = (0..block_count)
            .map(|_| Block {
                samples: vec![0; block_samples],
                state: BlockState::Free,
            })
            .collect();

        Self {
            blocks,
            current: 0,
            channel_count: format.channel_count as usize,
            time: 0.0,
            time_step: format.time_step(),
            mixer,
            sink,
            free_blocks,
            status,
        }
    }

    /// Ring index of the next block to render.
    pub fn current_block(&self) -> usize {
        self.current
    }

    pub fn block_state(&self, index: usize) -> Option<BlockState> {
        self.blocks.get(index).map(|b| b.state)
    }

    pub fn block(&self, index: usize) -> Option<&[i16]> {
        self.blocks.get(index).map(|b| b.samples.as_slice())
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Runs the render loop until `active` is cleared. `on_block` is called
    /// before each block is rendered, giving the caller a chance to apply
    /// pending changes to the mixer. Closes the sink on exit.
    pub fn run<F>(&mut self, active: &AtomicBool, mut on_block: F)
    where
        F: FnMut(&mut Mixer),
    {
        let span = span!(Level::INFO, "render loop");
        let _enter = span.enter();

        info!(
            blocks = self.blocks.len(),
            block_samples = self.blocks.first().map_or(0, |b| b.samples.len()),
            device = %self.sink,
            "Render loop started"
        );

        while active.load(Ordering::Acquire) {
            if !self.free_blocks.wait(active) {
                break;
            }

            on_block(&mut self.mixer);
            self.status.set_active_playbacks(self.mixer.playbacks().len());

            if let Err(e) = self.render_next() {
                error!(err = %e, "Unable to submit block, stopping render loop");
                break;
            }
        }

        self.sink.close();
        info!(
            blocks_rendered = self.status.blocks_rendered(),
            time = self.time,
            "Render loop stopped"
        );
    }

    /// Renders the block at the current ring index and submits it. Does
    /// nothing if no block is free.
    pub fn render_next(&mut self) -> Result<(), DeviceError> {
        if !self.free_blocks.claim() {
            return Ok(());
        }

        let index = self.current;
        let block = &mut self.blocks[index];
        if block.state == BlockState::Submitted {
            // A free slot was claimed, so the device is done with this block.
            trace!(block = index, "Reclaiming played block");
        }
        block.state = BlockState::Rendering;

        for frame in block.samples.chunks_mut(self.channel_count) {
            self.mixer.advance_frame(self.time_step);
            for (channel, out) in frame.iter_mut().enumerate() {
                *out = to_output_sample(self.mixer.mix_channel(channel, self.time, self.time_step));
            }
            self.time += self.time_step;
        }
        self.status.set_time(self.time);

        self.sink.submit(&block.samples)?;
        block.state = BlockState::Submitted;

        self.current = (self.current + 1) % self.blocks.len();
        self.status.set_active_playbacks(self.mixer.playbacks().len());
        self.status.release_playbacks(self.mixer.take_finished());
        // Published last so readers that see the new count also see the rest.
        self.status.blocks_rendered.fetch_add(1, Ordering::Release);
        Ok(())
    }
}
