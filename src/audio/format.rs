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

use crate::audio::DeviceError;

/// The only output sample width the engine renders.
pub const OUTPUT_BITS_PER_SAMPLE: u16 = 16;

/// The maximum representable magnitude of an output sample, `2^(bits-1) - 1`.
pub const MAX_SAMPLE: f64 = i16::MAX as f64;

/// The format a device sink is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channel_count: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl OutputFormat {
    /// Creates a new 16-bit output format.
    pub fn new(sample_rate: u32, channel_count: u16) -> Result<Self, DeviceError> {
        if sample_rate == 0 {
            return Err(DeviceError::UnsupportedConfig(
                "sample rate must be greater than 0".into(),
            ));
        }
        if channel_count == 0 {
            return Err(DeviceError::UnsupportedConfig(
                "channel count must be greater than 0".into(),
            ));
        }

        Ok(OutputFormat {
            sample_rate,
            channel_count,
            bits_per_sample: OUTPUT_BITS_PER_SAMPLE,
        })
    }

    /// Bytes per interleaved frame.
    pub fn block_align(&self) -> u16 {
        self.channel_count * (self.bits_per_sample / 8)
    }

    /// Average bytes per second of the output stream.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }

    /// The time between two frames, in seconds.
    pub fn time_step(&self) -> f64 {
        1.0 / f64::from(self.sample_rate)
    }
}

impl Default for OutputFormat {
    /// 44.1kHz, mono, 16-bit.
    fn default() -> Self {
        OutputFormat {
            sample_rate: 44100,
            channel_count: 1,
            bits_per_sample: OUTPUT_BITS_PER_SAMPLE,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate, self.channel_count, self.bits_per_sample
        )
    }
}

/// Symmetric clamp of `sample` into `[-max, max]`.
#[inline]
pub fn clip(sample: f64, max: f64) -> f64 {
    if sample >= 0.0 {
        sample.min(max)
    } else {
        sample.max(-max)
    }
}

/// Clips a mixed sample to unity and converts it to the output integer domain.
/// The conversion truncates toward zero.
#[inline]
pub fn to_output_sample(sample: f64) -> i16 {
    (clip(sample, 1.0) * MAX_SAMPLE) as i16
}
