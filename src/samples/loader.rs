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

//! WAV decoding into normalized in-memory clips.
//!
//! Only RIFF/WAVE files carrying 16-bit integer PCM are accepted. Chunks other
//! than "fmt " and "data" are skipped by the reader and never treated as audio.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::WavReader;
use tracing::debug;

use super::error::LoadError;
use super::store::AudioClip;

/// The only bit depth clips may be stored with.
const SUPPORTED_BITS_PER_SAMPLE: u16 = 16;

/// Decodes the WAV file at the given path.
pub fn decode_file(path: &Path) -> Result<AudioClip, LoadError> {
    let file = File::open(path)?;
    decode(BufReader::new(file))
}

/// Decodes a WAV stream into a clip.
pub fn decode<R: Read>(reader: R) -> Result<AudioClip, LoadError> {
    let mut wav_reader = WavReader::new(reader)?;
    let spec = wav_reader.spec();

    if spec.sample_format != hound::SampleFormat::Int {
        return Err(LoadError::UnsupportedSampleFormat);
    }
    if spec.bits_per_sample != SUPPORTED_BITS_PER_SAMPLE {
        return Err(LoadError::UnsupportedBitDepth(spec.bits_per_sample));
    }
    if spec.channels == 0 {
        return Err(LoadError::NoChannels);
    }

    let max_sample = max_magnitude(spec.bits_per_sample);
    let samples = wav_reader
        .samples::<i16>()
        .map(|sample| sample.map(|s| normalize(s, max_sample)))
        .collect::<Result<Vec<f32>, hound::Error>>()?;

    debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        samples = samples.len(),
        "Decoded WAV data"
    );

    Ok(AudioClip::new(samples, spec.channels, spec.sample_rate))
}

/// The maximum representable magnitude for the given bit depth, `2^(bits-1) - 1`.
fn max_magnitude(bits_per_sample: u16) -> f32 {
    ((1i64 << (bits_per_sample - 1)) - 1) as f32
}

/// Scales a raw sample by the maximum magnitude. The most negative integer
/// would land just below -1, so it is pinned there.
#[inline]
fn normalize(sample: i16, max_sample: f32) -> f32 {
    (f32::from(sample) / max_sample).max(-1.0)
}
