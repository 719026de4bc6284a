//! Optional on-disk configuration.
//!
//! Stored as JSON in a platform-appropriate config directory. Every field has
//! a default, so a missing file (or a partial one) is fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// On-disk configuration for the smoke test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides discovery of the `templates/` directory.
    pub templates_dir: Option<PathBuf>,

    /// Where screenshots are written.
    pub screenshot_dir: Option<PathBuf>,

    /// Monitor to capture (from `xcap::Monitor::name()`). Primary monitor if unset.
    pub monitor: Option<String>,

    /// OCR model language prefix (`<lang>_recognition.mnn`, `<lang>_charset.txt`).
    pub ocr_language: String,

    /// Delay between capture attempts while a detection waits.
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates_dir: None,
            screenshot_dir: None,
            monitor: None,
            ocr_language: "latin".to_string(),
            poll_interval_ms: 200,
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("rpa-smoketest.json"))
    }

    /// Load configuration from disk, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        match Self::path().and_then(|path| Self::try_load(&path)) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load config; using defaults");
                Self::default()
            }
        }
    }

    /// Try to load configuration from `path`. A missing file yields defaults.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let cfg = serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))?;
        tracing::debug!(?path, "loaded config");
        Ok(cfg)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Screenshot directory: configured, else `<cache>/rpa-smoketest/screenshots`, else temp.
    pub fn screenshot_dir(&self) -> PathBuf {
        if let Some(dir) = &self.screenshot_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .map(|dir| dir.join("rpa-smoketest").join("screenshots"))
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::try_load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpa-smoketest.json");
        fs::write(&path, r#"{ "monitor": "DP-1", "poll_interval_ms": 50 }"#).unwrap();

        let cfg = Config::try_load(&path).unwrap();
        assert_eq!(cfg.monitor.as_deref(), Some("DP-1"));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
        assert_eq!(cfg.ocr_language, "latin");
        assert_eq!(cfg.templates_dir, None);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpa-smoketest.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::try_load(&path).is_err());
    }

    #[test]
    fn configured_screenshot_dir_wins() {
        let cfg = Config {
            screenshot_dir: Some(PathBuf::from("/tmp/shots")),
            ..Config::default()
        };
        assert_eq!(cfg.screenshot_dir(), PathBuf::from("/tmp/shots"));
    }
}
