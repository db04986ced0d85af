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

//! Append-only storage of decoded clips.
//!
//! Clips are identified by a stable, dense, 1-based [`ClipId`]. There is no
//! unload operation, so an id handed out once stays valid for the lifetime of
//! the store.

use std::fmt;
use std::io::Read;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::info;

use super::error::LoadError;
use super::loader;

/// Identifies a clip in a [`SampleStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(NonZeroU32);

impl ClipId {
    /// Creates a clip id from its 1-based raw value. Returns None for 0.
    pub fn new(raw: u32) -> Option<ClipId> {
        NonZeroU32::new(raw).map(ClipId)
    }

    /// Returns the 1-based raw value.
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Returns the 0-based position of the clip in the store.
    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded clip: interleaved, normalized samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
    frames: usize,
}

impl AudioClip {
    /// Creates a clip from interleaved samples. Trailing samples that do not
    /// make up a whole frame are dropped.
    pub fn new(mut samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        let frames = if channel_count > 0 {
            samples.len() / channel_count as usize
        } else {
            0
        };
        samples.truncate(frames * channel_count as usize);

        Self {
            samples,
            channel_count,
            sample_rate,
            frames,
        }
    }

    /// The sample at the given frame and channel. Channels beyond the clip's own
    /// channel count wrap around, so a mono clip feeds every output channel.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        if self.channel_count == 0 {
            return 0.0;
        }
        let channels = self.channel_count as usize;
        self.samples
            .get(frame * channels + channel % channels)
            .copied()
            .unwrap_or(0.0)
    }

    /// The interleaved sample data.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// The native sample rate the clip was recorded at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// Owns every clip loaded for the lifetime of an engine.
#[derive(Default)]
pub struct SampleStore {
    clips: RwLock<Vec<Arc<AudioClip>>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a WAV file and appends it to the store. On failure the store is
    /// left untouched.
    pub fn load(&self, path: &Path) -> Result<ClipId, LoadError> {
        let clip = loader::decode_file(path)?;
        let id = self.insert(clip)?;

        if let Some(clip) = self.get(id) {
            info!(
                path = ?path,
                id = id.get(),
                channels = clip.channel_count(),
                sample_rate = clip.sample_rate(),
                frames = clip.frames(),
                memory_kb = clip.memory_size() / 1024,
                "Clip loaded"
            );
        }
        Ok(id)
    }

    /// Decodes a WAV stream and appends it to the store.
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<ClipId, LoadError> {
        let clip = loader::decode(reader)?;
        self.insert(clip)
    }

    /// Appends an already decoded clip.
    pub fn insert(&self, clip: AudioClip) -> Result<ClipId, LoadError> {
        let mut clips = self.clips.write();
        let raw = u32::try_from(clips.len() + 1).map_err(|_| LoadError::StoreFull)?;
        let id = ClipId::new(raw).ok_or(LoadError::StoreFull)?;
        clips.push(Arc::new(clip));
        Ok(id)
    }

    /// Looks up a clip. Returns None for ids this store never handed out.
    pub fn get(&self, id: ClipId) -> Option<Arc<AudioClip>> {
        self.clips.read().get(id.index()).cloned()
    }

    pub fn len(&self) -> usize {
        self.clips.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.read().is_empty()
    }

    /// Returns the total memory used by stored clips.
    pub fn total_memory_usage(&self) -> usize {
        self.clips.read().iter().map(|c| c.memory_size()).sum()
    }
}

impl fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStore")
            .field("clips", &self.len())
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{wav_bytes, write_wav};

    #[test]
    fn test_clip_id() {
        assert!(ClipId::new(0).is_none());
        let id = ClipId::new(3).unwrap();
        assert_eq!(id.get(), 3);
        assert_eq!(id.index(), 2);
        assert_eq!(id.to_string(), "3");
    }

    #[test]
    fn test_audio_clip_frames() {
        let clip = AudioClip::new(vec![0.1, 0.2, 0.3, 0.4, 0.5], 2, 22050);
        assert_eq!(clip.frames(), 2);
        assert_eq!(clip.samples().len(), 4);
        assert_eq!(clip.sample(1, 0), 0.3);
        assert_eq!(clip.sample(1, 1), 0.4);
        assert_eq!(clip.sample(5, 0), 0.0);
        assert_eq!(clip.duration(), Duration::from_secs_f64(2.0 / 22050.0));
    }

    #[test]
    fn test_audio_clip_channel_wrap() {
        let clip = AudioClip::new(vec![0.25, -0.5], 1, 44100);
        assert_eq!(clip.sample(0, 0), 0.25);
        assert_eq!(clip.sample(0, 1), 0.25);
        assert_eq!(clip.sample(1, 3), -0.5);
    }

    #[test]
    fn test_store_ids_are_one_based_and_stable() {
        let store = SampleStore::new();
        assert!(store.is_empty());

        let first = store.insert(AudioClip::new(vec![0.1], 1, 44100)).unwrap();
        let second = store.insert(AudioClip::new(vec![0.2, 0.3], 1, 8000)).unwrap();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert_eq!(store.len(), 2);

        assert_eq!(store.get(first).unwrap().samples(), &[0.1]);
        assert_eq!(store.get(second).unwrap().sample_rate(), 8000);
        assert!(store.get(ClipId::new(3).unwrap()).is_none());
    }

    #[test]
    fn test_store_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, 2, 48000, &[0, 32767, -32767, 16384]).unwrap();

        let store = SampleStore::new();
        let id = store.load(&path).unwrap();
        assert_eq!(id.get(), 1);

        let clip = store.get(id).unwrap();
        assert_eq!(clip.channel_count(), 2);
        assert_eq!(clip.sample_rate(), 48000);
        assert_eq!(clip.frames(), 2);
        assert_eq!(clip.sample(0, 1), 1.0);
        assert_eq!(clip.sample(1, 0), -1.0);
    }

    #[test]
    fn test_store_failed_load_leaves_store_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new();
        store.insert(AudioClip::new(vec![0.0], 1, 44100)).unwrap();

        assert!(store.load(&dir.path().join("missing.wav")).is_err());
        assert!(store.load_reader(&b"RIFX\0\0\0\0WAVE"[..]).is_err());

        let eight_bit = wav_bytes(1, 44100, 8, &[], &[0x80, 0x80]);
        assert!(matches!(
            store.load_reader(&eight_bit[..]),
            Err(LoadError::UnsupportedBitDepth(8))
        ));

        assert_eq!(store.len(), 1);

        // The next successful load still gets the next dense id.
        let id = store
            .load_reader(&wav_bytes(1, 44100, 16, &[], &[0, 0])[..])
            .unwrap();
        assert_eq!(id.get(), 2);
    }
}
