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

//! Bookkeeping for clips that are currently playing.

use std::fmt;
use std::sync::Arc;

use super::error::PlaybackError;
use super::store::{AudioClip, ClipId};

/// One playing instance of a clip.
pub struct PlaybackInstance {
    clip_id: ClipId,
    clip: Arc<AudioClip>,
    /// Current frame position. Only a loop restart moves it backwards.
    position: usize,
    looping: bool,
    finished: bool,
}

impl PlaybackInstance {
    /// Creates a new instance positioned at the start of the clip.
    pub fn new(clip_id: ClipId, clip: Arc<AudioClip>, looping: bool) -> Self {
        Self {
            clip_id,
            clip,
            position: 0,
            looping,
            finished: false,
        }
    }

    pub fn clip_id(&self) -> ClipId {
        self.clip_id
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advances by one tick. The step is derived from the clip's native sample
    /// rate, so clips recorded at a different rate than the output play faster
    /// or slower.
    #[inline]
    fn advance(&mut self, time_step: f64) {
        let step = (f64::from(self.clip.sample_rate()) * time_step).round() as usize;
        self.position = self.position.saturating_add(step);
        self.finished = self.position >= self.clip.frames();
    }

    #[inline]
    fn sample(&self, channel: usize) -> f64 {
        f64::from(self.clip.sample(self.position, channel))
    }

    /// Rewinds a looping instance. It stays silent until the next advance.
    fn restart(&mut self) {
        self.position = 0;
    }
}

impl fmt::Debug for PlaybackInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackInstance")
            .field("clip_id", &self.clip_id)
            .field("position", &self.position)
            .field("looping", &self.looping)
            .field("finished", &self.finished)
            .finish()
    }
}

/// The set of active playback instances.
#[derive(Debug)]
pub struct PlaybackSet {
    instances: Vec<PlaybackInstance>,
    max_instances: usize,
    /// Non-looping instances removed by `advance` and not yet collected.
    finished: usize,
}

impl PlaybackSet {
    /// Creates a new playback set holding at most `max_instances` instances.
    pub fn new(max_instances: usize) -> Self {
        Self {
            instances: Vec::new(),
            max_instances,
            finished: 0,
        }
    }

    /// Starts a new instance of the clip at position 0.
    pub fn play(
        &mut self,
        clip_id: ClipId,
        clip: Arc<AudioClip>,
        looping: bool,
    ) -> Result<(), PlaybackError> {
        if self.instances.len() >= self.max_instances {
            return Err(PlaybackError::TooManyPlaybacks(self.max_instances));
        }
        self.instances.push(PlaybackInstance::new(clip_id, clip, looping));
        Ok(())
    }

    /// Removes every instance of the clip. Returns how many were removed.
    pub fn stop(&mut self, clip_id: ClipId) -> usize {
        let before = self.instances.len();
        self.instances.retain(|i| i.clip_id != clip_id);
        before - self.instances.len()
    }

    /// Removes every instance. Returns how many were removed.
    pub fn stop_all(&mut self) -> usize {
        let removed = self.instances.len();
        self.instances.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Returns true if any instance of the clip is active.
    pub fn is_playing(&self, clip_id: ClipId) -> bool {
        self.instances.iter().any(|i| i.clip_id == clip_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaybackInstance> {
        self.instances.iter()
    }

    /// Moves every instance forward one frame.
    ///
    /// Instances that run off the end contribute nothing to this frame.
    /// Looping ones are rewound to position 0 in the same pass; the rest are
    /// removed and counted in [`PlaybackSet::take_finished`].
    pub fn advance(&mut self, time_step: f64) {
        let mut finished = 0;
        self.instances.retain_mut(|instance| {
            instance.advance(time_step);
            if !instance.finished {
                return true;
            }
            if instance.looping {
                instance.restart();
                return true;
            }
            finished += 1;
            false
        });
        self.finished += finished;
    }

    /// Sums the instances' contribution to one channel at their current
    /// positions. Instances that have run off the end contribute nothing.
    pub fn mix(&self, channel: usize) -> f64 {
        self.instances
            .iter()
            .filter(|i| !i.finished)
            .fold(0.0, |acc, i| acc + i.sample(channel))
    }

    /// Returns how many instances finished on their own since the last call.
    pub fn take_finished(&mut self) -> usize {
        std::mem::take(&mut self.finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f64 = 1.0 / 44100.0;

    fn clip(samples: Vec<f32>, channels: u16) -> Arc<AudioClip> {
        Arc::new(AudioClip::new(samples, channels, 44100))
    }

    fn id(raw: u32) -> ClipId {
        ClipId::new(raw).unwrap()
    }

    /// Advances one frame and mixes channel 0.
    fn tick(set: &mut PlaybackSet) -> f64 {
        set.advance(STEP);
        set.mix(0)
    }

    #[test]
    fn test_play_and_stop() {
        let mut set = PlaybackSet::new(16);
        let a = clip(vec![0.1; 8], 1);
        let b = clip(vec![0.2; 8], 1);

        set.play(id(1), a.clone(), false).unwrap();
        set.play(id(2), b, true).unwrap();
        set.play(id(1), a, true).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.is_playing(id(1)));

        assert_eq!(set.stop(id(1)), 2);
        assert_eq!(set.len(), 1);
        assert!(!set.is_playing(id(1)));
        assert!(set.is_playing(id(2)));

        // Stopping something that isn't playing does nothing.
        assert_eq!(set.stop(id(7)), 0);
        assert_eq!(set.len(), 1);

        assert_eq!(set.stop_all(), 1);
        assert!(set.is_empty());
        assert_eq!(set.take_finished(), 0);
    }

    #[test]
    fn test_playback_cap() {
        let mut set = PlaybackSet::new(2);
        let a = clip(vec![0.1; 8], 1);
        set.play(id(1), a.clone(), false).unwrap();
        set.play(id(1), a.clone(), false).unwrap();
        assert_eq!(
            set.play(id(1), a, false),
            Err(PlaybackError::TooManyPlaybacks(2))
        );
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_advance_reads_after_step() {
        let mut set = PlaybackSet::new(4);
        set.play(id(1), clip(vec![0.1, 0.2, 0.3], 1), false).unwrap();

        // Position 0 is skipped: the instance advances before it is read.
        assert_eq!(tick(&mut set), f64::from(0.2f32));
        assert_eq!(set.iter().next().unwrap().position(), 1);
        assert_eq!(tick(&mut set), f64::from(0.3f32));
        assert_eq!(set.iter().next().unwrap().position(), 2);
    }

    #[test]
    fn test_non_looping_finishes_at_end_and_is_removed() {
        let mut set = PlaybackSet::new(4);
        set.play(id(1), clip(vec![0.5; 4], 1), false).unwrap();

        for _ in 0..3 {
            assert_eq!(tick(&mut set), 0.5);
        }
        assert_eq!(set.len(), 1);
        assert_eq!(set.take_finished(), 0);

        // Position reaches 4 == frames: finished, contributes nothing, removed.
        assert_eq!(tick(&mut set), 0.0);
        assert!(set.is_empty());
        assert_eq!(set.take_finished(), 1);
        assert_eq!(set.take_finished(), 0);
        assert_eq!(tick(&mut set), 0.0);
    }

    #[test]
    fn test_looping_restarts() {
        let mut set = PlaybackSet::new(4);
        set.play(id(3), clip(vec![0.25; 2], 1), true).unwrap();

        assert_eq!(tick(&mut set), 0.25);
        // Ran off the end: rewound, silent for this frame.
        assert_eq!(tick(&mut set), 0.0);
        assert_eq!(set.len(), 1);
        let instance = set.iter().next().unwrap();
        assert_eq!(instance.position(), 0);
        assert!(instance.is_finished());
        assert!(instance.is_looping());
        assert_eq!(instance.clip_id(), id(3));

        assert_eq!(tick(&mut set), 0.25);
        let instance = set.iter().next().unwrap();
        assert_eq!(instance.position(), 1);
        assert!(!instance.is_finished());
        assert_eq!(set.take_finished(), 0);
    }

    #[test]
    fn test_zero_frame_clip_finishes_immediately() {
        let mut set = PlaybackSet::new(4);
        set.play(id(1), clip(vec![], 1), false).unwrap();
        assert_eq!(tick(&mut set), 0.0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_simultaneous_loops_are_independent() {
        let mut set = PlaybackSet::new(4);
        let c = clip(vec![0.0, 0.1, 0.2, 0.3], 1);
        set.play(id(1), c.clone(), true).unwrap();
        assert_eq!(tick(&mut set), f64::from(0.1f32));
        set.play(id(1), c, true).unwrap();

        let mixed = tick(&mut set);
        assert!((mixed - f64::from(0.2f32) - f64::from(0.1f32)).abs() < 1e-9);

        let positions: Vec<usize> = set.iter().map(|i| i.position()).collect();
        assert_eq!(positions, vec![2, 1]);
    }

    #[test]
    fn test_step_follows_native_rate() {
        let mut set = PlaybackSet::new(4);
        let fast = Arc::new(AudioClip::new(vec![0.0; 100], 1, 88200));
        set.play(id(1), fast, false).unwrap();
        set.advance(STEP);
        assert_eq!(set.iter().next().unwrap().position(), 2);
    }

    #[test]
    fn test_mix_keeps_position() {
        let mut set = PlaybackSet::new(4);
        set.play(id(1), clip(vec![0.1, 0.2, 0.3, 0.4], 2), false).unwrap();

        set.advance(STEP);
        assert_eq!(set.mix(0), f64::from(0.3f32));
        assert_eq!(set.mix(1), f64::from(0.4f32));
        assert_eq!(set.mix(1), f64::from(0.4f32));
        assert_eq!(set.iter().next().unwrap().position(), 1);
    }
}
