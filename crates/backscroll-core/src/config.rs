use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tuning knobs for paging, trimming and visibility detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagerConfig {
    /// Number of sequence entries fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Rendered height, in viewports, kept on the side away from the loading edge
    #[serde(default = "default_eviction_buffer_viewports")]
    pub eviction_buffer_viewports: u32,

    /// Pre-trigger margin for the top and bottom sentinels, in pixels
    #[serde(default = "default_sentinel_margin_px")]
    pub sentinel_margin_px: u32,

    /// Intersection ratios at which unread elements are re-evaluated
    #[serde(default = "default_unread_thresholds")]
    pub unread_thresholds: Vec<f64>,
}

fn default_page_size() -> usize {
    30
}

fn default_eviction_buffer_viewports() -> u32 {
    4
}

fn default_sentinel_margin_px() -> u32 {
    80
}

fn default_unread_thresholds() -> Vec<f64> {
    vec![0.0, 1.0]
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            eviction_buffer_viewports: default_eviction_buffer_viewports(),
            sentinel_margin_px: default_sentinel_margin_px(),
            unread_thresholds: default_unread_thresholds(),
        }
    }
}

impl PagerConfig {
    /// Get the path to the pager config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::Config("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("backscroll").join("pager.toml"))
    }

    /// Load the config from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load from an explicit path. A missing file yields defaults; an unparsable
    /// one is reported and replaced by defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        match toml::from_str::<Self>(&contents) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse pager config at {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Save the config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        if self.eviction_buffer_viewports == 0 {
            return Err(Error::Config(
                "eviction_buffer_viewports must be at least 1".to_string(),
            ));
        }
        if self
            .unread_thresholds
            .iter()
            .any(|t| !(0.0..=1.0).contains(t))
        {
            return Err(Error::Config(
                "unread_thresholds must lie within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PagerConfig::default();
        assert_eq!(config.page_size, 30);
        assert_eq!(config.eviction_buffer_viewports, 4);
        assert_eq!(config.sentinel_margin_px, 80);
        assert_eq!(config.unread_thresholds, vec![0.0, 1.0]);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PagerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PagerConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pager.toml");
        std::fs::write(&path, "page_size = 50\n").unwrap();

        let config = PagerConfig::load_from(&path).unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.sentinel_margin_px, 80);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pager.toml");
        std::fs::write(&path, "page_size = \"lots\"").unwrap();

        let config = PagerConfig::load_from(&path).unwrap();
        assert_eq!(config, PagerConfig::default());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pager.toml");
        std::fs::write(&path, "page_size = 0\n").unwrap();

        assert!(matches!(
            PagerConfig::load_from(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pager.toml");
        let config = PagerConfig {
            page_size: 12,
            sentinel_margin_px: 40,
            ..PagerConfig::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(PagerConfig::load_from(&path).unwrap(), config);
    }
}
