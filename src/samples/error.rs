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
/// Error types for clip loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unsupported bit depth: {0} (only 16-bit PCM is supported)")]
    UnsupportedBitDepth(u16),

    #[error("Unsupported sample format (only integer PCM is supported)")]
    UnsupportedSampleFormat,

    #[error("WAV file declares no channels")]
    NoChannels,

    #[error("Sample store is full")]
    StoreFull,

    #[error("WAV error: {0}")]
    WavError(#[from] hound::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Error types for playback bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Too many active playbacks (limit {0})")]
    TooManyPlaybacks(usize),
}
