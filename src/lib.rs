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

//! A block-scheduled real-time mixing engine.
//!
//! Decoded WAV clips, an optional generator and an optional filter are mixed
//! into fixed-size blocks of 16-bit PCM by a dedicated render thread, which
//! stays a bounded number of blocks ahead of the output device.

pub mod audio;
pub mod config;
pub mod engine;
pub mod samples;
#[cfg(test)]
mod testutil;

pub use engine::{Command, Engine, EngineError};
pub use samples::{AudioClip, ClipId};
