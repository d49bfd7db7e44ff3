//! Process-level configuration: read a TOML file from the working
//! directory, fall back to documented defaults if it is absent.
//!
//! Per-model knobs (thresholds, input size, YOLO version) are *not* here —
//! those live entirely in the model manifest (see `manifest.rs`) so that
//! swapping models never requires a process restart.

use std::fs::read_to_string;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "cira.toml";

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_camera_device() -> i32 {
    0
}

fn default_annotate_every_n() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_camera_device")]
    pub default_camera_device: i32,
    /// Publish an annotated frame-file every Nth capture iteration (§4.4).
    #[serde(default = "default_annotate_every_n")]
    pub annotate_every_n: u32,
}

impl RuntimeConfig {
    pub fn new() -> anyhow::Result<Self> {
        let text = read_to_string(CONFIG_FILE)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn load_or_default() -> Self {
        match Self::new() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "no {CONFIG_FILE} found, using defaults");
                Self::default()
            }
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            temp_dir: default_temp_dir(),
            default_camera_device: default_camera_device(),
            annotate_every_n: default_annotate_every_n(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.annotate_every_n, 3);
        assert_eq!(cfg.default_camera_device, 0);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: RuntimeConfig = toml::from_str(r#"bind_addr = "127.0.0.1:9000""#).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.annotate_every_n, 3);
    }
}
