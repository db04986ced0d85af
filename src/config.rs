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
use std::path::Path;

use tracing::debug;

mod engine;
mod error;

pub use engine::EngineConfig;
pub use error::ConfigError;

/// Prefix for environment variables that override file values, e.g.
/// BLOCKMIX_SAMPLE_RATE=48000.
const ENV_PREFIX: &str = "BLOCKMIX";

/// Loads and validates the engine configuration from the given file. The
/// format is inferred from the file extension (YAML, TOML, JSON...).
pub fn load(path: &Path) -> Result<EngineConfig, ConfigError> {
    let engine_config: EngineConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?
        .try_deserialize()?;
    engine_config.validate()?;

    debug!(path = %path.display(), config = ?engine_config, "Loaded engine config");
    Ok(engine_config)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("engine.yaml");
        fs::write(&path, "channel_count: 2\nblock_sample_count: 256\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.channel_count(), 2);
        assert_eq!(config.block_sample_count(), 256);

        // Environment variables override file values.
        std::env::set_var("BLOCKMIX_MAX_PLAYBACKS", "12");
        let config = load(&path);
        std::env::remove_var("BLOCKMIX_MAX_PLAYBACKS");
        assert_eq!(config.unwrap().max_playbacks(), 12);

        let invalid = dir.path().join("invalid.yaml");
        fs::write(&invalid, "channel_count: 2\nblock_sample_count: 255\n").unwrap();
        assert!(matches!(load(&invalid), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
