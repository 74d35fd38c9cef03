use anyhow::{Context, Result};
use complexion_core::runtime::DEFAULT_CANONICAL_SIZE;
use complexion_core::QualityConfig;
use std::path::{Path, PathBuf};

/// Worker configuration, loaded from environment variables and an optional TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Edge length of the canonical tensor.
    pub canonical_size: usize,
    /// Requests allowed to wait for the engine thread, and the cap on requests
    /// read from input but not yet answered.
    pub queue_depth: usize,
    /// Thresholds applied before scoring.
    pub quality: QualityConfig,
    /// TOML file the quality thresholds came from, if any.
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `COMPLEXION_*` environment variables with defaults.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COMPLEXION_CONFIG").ok().map(PathBuf::from);
        let quality = match &config_path {
            Some(path) => load_quality(path)?,
            None => QualityConfig::default(),
        };

        Ok(Self {
            canonical_size: env_usize("COMPLEXION_CANONICAL_SIZE", DEFAULT_CANONICAL_SIZE),
            queue_depth: env_usize("COMPLEXION_QUEUE_DEPTH", 4),
            quality,
            config_path,
        })
    }
}

/// Read the `[quality]` table of a TOML file; missing keys keep their defaults.
pub fn load_quality(path: &Path) -> Result<QualityConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    QualityConfig::from_toml(&text)
        .with_context(|| format!("invalid config file {}", path.display()))
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_quality_from_file() {
        let path = std::env::temp_dir().join(format!("complexion-{}.toml", std::process::id()));
        std::fs::write(&path, "[quality]\nmin_width = 640\nrequire_face = false\n").unwrap();
        let cfg = load_quality(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.min_width, 640);
        assert!(!cfg.require_face);
        assert_eq!(cfg.min_height, 512);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let path = std::env::temp_dir().join(format!("complexion-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[quality]\nmin_width = \"wide\"\n").unwrap();
        let result = load_quality(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_quality(Path::new("/nonexistent/complexion.toml")).is_err());
    }

    #[test]
    fn test_env_usize_fallback() {
        assert_eq!(env_usize("COMPLEXION_TEST_UNSET_KEY", 7), 7);
    }
}
