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
// Core mixing logic, independent of any audio backend.
use std::sync::Arc;

use crate::samples::{AudioClip, ClipId, PlaybackError, PlaybackSet};

/// Produces signal that is added to the mix after the playing clips.
pub trait Generator: Send {
    /// Returns the generated sample for the channel at the given time.
    fn generate(&mut self, channel: usize, time: f64, time_step: f64) -> f64;
}

impl<F> Generator for F
where
    F: FnMut(usize, f64, f64) -> f64 + Send,
{
    fn generate(&mut self, channel: usize, time: f64, time_step: f64) -> f64 {
        self(channel, time, time_step)
    }
}

/// Replaces the fully mixed signal of a channel with its own output.
pub trait Filter: Send {
    /// Returns the filtered sample for the channel given the mixed sample.
    fn filter(&mut self, channel: usize, time: f64, sample: f64) -> f64;
}

impl<F> Filter for F
where
    F: FnMut(usize, f64, f64) -> f64 + Send,
{
    fn filter(&mut self, channel: usize, time: f64, sample: f64) -> f64 {
        self(channel, time, sample)
    }
}

/// Combines playing clips, an optional generator and an optional filter.
///
/// Owned by the render thread. Callers reach it only through the engine's
/// command queue.
pub struct Mixer {
    /// Playing clip instances
    playbacks: PlaybackSet,
    /// Generated signal added after the clips
    generator: Option<Box<dyn Generator>>,
    /// Override applied to the final mix
    filter: Option<Box<dyn Filter>>,
}

impl Mixer {
    /// Creates a new mixer allowing at most `max_playbacks` playing instances.
    pub fn new(max_playbacks: usize) -> Self {
        Self {
            playbacks: PlaybackSet::new(max_playbacks),
            generator: None,
            filter: None,
        }
    }

    /// Starts playing a clip from the beginning.
    pub fn play(
        &mut self,
        clip_id: ClipId,
        clip: Arc<AudioClip>,
        looping: bool,
    ) -> Result<(), PlaybackError> {
        self.playbacks.play(clip_id, clip, looping)
    }

    /// Stops every instance of the clip.
    pub fn stop(&mut self, clip_id: ClipId) -> usize {
        self.playbacks.stop(clip_id)
    }

    /// Stops every instance. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        self.playbacks.stop_all()
    }

    pub fn set_generator(&mut self, generator: Box<dyn Generator>) {
        self.generator = Some(generator);
    }

    pub fn clear_generator(&mut self) {
        self.generator = None;
    }

    pub fn set_filter(&mut self, filter: Box<dyn Filter>) {
        self.filter = Some(filter);
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    pub fn playbacks(&self) -> &PlaybackSet {
        &self.playbacks
    }

    /// Moves every playing instance forward one frame. Called once per frame
    /// before its channels are mixed.
    pub fn advance_frame(&mut self, time_step: f64) {
        self.playbacks.advance(time_step);
    }

    /// Returns how many non-looping instances ran to completion since the
    /// last call.
    pub fn take_finished(&mut self) -> usize {
        self.playbacks.take_finished()
    }

    /// Mixes one sample for one channel of the current frame.
    ///
    /// Playing instances are summed first, then the generator is added, then
    /// the filter (if any) replaces the result. Positions are left alone; see
    /// [`Mixer::advance_frame`].
    pub fn mix_channel(&mut self, channel: usize, time: f64, time_step: f64) -> f64 {
        let mut sample = self.playbacks.mix(channel);

        if let Some(generator) = self.generator.as_mut() {
            sample += generator.generate(channel, time, time_step);
        }

        match self.filter.as_mut() {
            Some(filter) => filter.filter(channel, time, sample),
            None => sample,
        }
    }

    /// Mixes `num_frames` interleaved frames starting at `start_time`.
    pub fn process_frames(
        &mut self,
        num_channels: usize,
        num_frames: usize,
        start_time: f64,
        time_step: f64,
    ) -> Vec<f64> {
        let mut frames = Vec::with_capacity(num_frames * num_channels);
        let mut time = start_time;

        for _ in 0..num_frames {
            self.advance_frame(time_step);
            for channel in 0..num_channels {
                frames.push(self.mix_channel(channel, time, time_step));
            }
            time += time_step;
        }

        frames
    }
}
