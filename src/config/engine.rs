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
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNEL_COUNT: u16 = 1;
const DEFAULT_BLOCK_COUNT: usize = 8;
const DEFAULT_BLOCK_SAMPLE_COUNT: usize = 512;
const DEFAULT_MAX_PLAYBACKS: usize = 256;

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct EngineConfig {
    /// The output device. Uses the host's default device when unset.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Number of interleaved output channels (default: 1)
    channel_count: Option<u16>,

    /// Number of blocks in the ring (default: 8)
    block_count: Option<usize>,

    /// Interleaved samples per block, frames times channels (default: 512)
    block_sample_count: Option<usize>,

    /// Maximum number of simultaneously playing clip instances (default: 256)
    max_playbacks: Option<usize>,
}

impl EngineConfig {
    /// New will create a new engine configuration with every value defaulted.
    pub fn new() -> EngineConfig {
        EngineConfig::default()
    }

    pub fn with_device(mut self, device: &str) -> EngineConfig {
        self.device = Some(device.to_string());
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> EngineConfig {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_channel_count(mut self, channel_count: u16) -> EngineConfig {
        self.channel_count = Some(channel_count);
        self
    }

    pub fn with_block_count(mut self, block_count: usize) -> EngineConfig {
        self.block_count = Some(block_count);
        self
    }

    pub fn with_block_sample_count(mut self, block_sample_count: usize) -> EngineConfig {
        self.block_sample_count = Some(block_sample_count);
        self
    }

    pub fn with_max_playbacks(mut self, max_playbacks: usize) -> EngineConfig {
        self.max_playbacks = Some(max_playbacks);
        self
    }

    /// Returns the configured device name, if any.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 1)
    pub fn channel_count(&self) -> u16 {
        self.channel_count.unwrap_or(DEFAULT_CHANNEL_COUNT)
    }

    /// Returns the number of blocks in the ring (default: 8)
    pub fn block_count(&self) -> usize {
        self.block_count.unwrap_or(DEFAULT_BLOCK_COUNT)
    }

    /// Returns the interleaved samples per block (default: 512)
    pub fn block_sample_count(&self) -> usize {
        self.block_sample_count.unwrap_or(DEFAULT_BLOCK_SAMPLE_COUNT)
    }

    /// Returns the frames per block.
    pub fn block_frames(&self) -> usize {
        self.block_sample_count() / usize::from(self.channel_count().max(1))
    }

    /// Returns the playback cap (default: 256)
    pub fn max_playbacks(&self) -> usize {
        self.max_playbacks.unwrap_or(DEFAULT_MAX_PLAYBACKS)
    }

    /// Checks that the configuration describes a usable block ring.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid("sample_rate must be greater than 0".into()));
        }
        if self.channel_count() == 0 {
            return Err(ConfigError::Invalid(
                "channel_count must be greater than 0".into(),
            ));
        }
        if self.block_count() == 0 {
            return Err(ConfigError::Invalid("block_count must be greater than 0".into()));
        }
        let block_sample_count = self.block_sample_count();
        if block_sample_count == 0 {
            return Err(ConfigError::Invalid(
                "block_sample_count must be greater than 0".into(),
            ));
        }
        if block_sample_count % usize::from(self.channel_count()) != 0 {
            return Err(ConfigError::Invalid(format!(
                "block_sample_count {} is not a multiple of channel_count {}",
                block_sample_count,
                self.channel_count()
            )));
        }
        if self.max_playbacks() == 0 {
            return Err(ConfigError::Invalid(
                "max_playbacks must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> EngineConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize::<EngineConfig>()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.device(), None);
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.channel_count(), 1);
        assert_eq!(config.block_count(), 8);
        assert_eq!(config.block_sample_count(), 512);
        assert_eq!(config.block_frames(), 512);
        assert_eq!(config.max_playbacks(), 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize() {
        let config = parse(
            r#"
            device: mock-device
            sample_rate: 48000
            channel_count: 2
            block_count: 4
            block_sample_count: 1024
            max_playbacks: 16
            "#,
        );
        assert_eq!(config.device(), Some("mock-device"));
        assert_eq!(config.sample_rate(), 48000);
        assert_eq!(config.channel_count(), 2);
        assert_eq!(config.block_count(), 4);
        assert_eq!(config.block_sample_count(), 1024);
        assert_eq!(config.block_frames(), 512);
        assert_eq!(config.max_playbacks(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config = parse("channel_count: 2\n");
        assert_eq!(config.channel_count(), 2);
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config, EngineConfig::new().with_channel_count(2));
    }

    #[test]
    fn test_validate() {
        let invalid = [
            EngineConfig::new().with_sample_rate(0),
            EngineConfig::new().with_channel_count(0),
            EngineConfig::new().with_block_count(0),
            EngineConfig::new().with_block_sample_count(0),
            EngineConfig::new()
                .with_channel_count(2)
                .with_block_sample_count(511),
            EngineConfig::new().with_max_playbacks(0),
        ];
        for config in invalid {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{:?}",
                config
            );
        }

        assert!(EngineConfig::new()
            .with_channel_count(2)
            .with_block_sample_count(1024)
            .validate()
            .is_ok());
    }
}
