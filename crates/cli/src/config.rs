use anyhow::{Context, Result};
use segment_aligner::{AlignerConfig, MatchStrategy, TieBreak};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file used when `--config` is not given
pub const CONFIG_ENV: &str = "SEGMENT_ALIGN_CONFIG";

/// Flag values that take precedence over the config file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub strategy: Option<MatchStrategy>,
    pub tie_break: Option<TieBreak>,
    pub window_size: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AlignerConfig) {
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(tie_break) = self.tie_break {
            config.tie_break = tie_break;
        }
        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
    }
}

/// Load the aligner config from `path`, then `$SEGMENT_ALIGN_CONFIG`, else defaults
pub fn load(path: Option<&Path>) -> Result<AlignerConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
    let Some(path) = path else {
        return Ok(AlignerConfig::default());
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AlignerConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    log::debug!("Loaded aligner config from {}", path.display());
    Ok(config)
}

/// Load and override, then validate
pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<AlignerConfig> {
    let mut config = load(path)?;
    overrides.apply(&mut config);
    config.validate().context("Invalid aligner configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_then_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aligner.toml");
        fs::write(&path, "window_size = 4\ntie_break = \"first_seen\"\n").unwrap();

        let overrides = Overrides {
            strategy: Some(MatchStrategy::Lookup),
            window_size: Some(12),
            ..Default::default()
        };
        let config = resolve(Some(&path), &overrides).unwrap();
        assert_eq!(config.window_size, 12);
        assert_eq!(config.strategy, MatchStrategy::Lookup);
        assert_eq!(config.tie_break, TieBreak::FirstSeen);
        assert_eq!(config.min_depth, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aligner.toml");
        fs::write(&path, "min_depth = 9\n").unwrap();
        assert!(resolve(Some(&path), &Overrides::default()).is_err());

        fs::write(&path, "window_size = \"wide\"\n").unwrap();
        let err = load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
