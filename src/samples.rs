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

//! Clip storage and playback bookkeeping.
//!
//! This module provides:
//! - WAV decoding into normalized in-memory clips
//! - An append-only clip store with stable 1-based ids
//! - The set of playing clip instances consumed by the mixer

mod error;
mod loader;
mod playback;
mod store;

pub use error::{LoadError, PlaybackError};
pub use loader::{decode, decode_file};
pub use playback::{PlaybackInstance, PlaybackSet};
pub use store::{AudioClip, ClipId, SampleStore};
