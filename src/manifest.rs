//! Model manifest (`cira_model.json`) loading (§3, §4.1).
//!
//! Parsed with `serde_json` rather than ad hoc substring scanning: a
//! malformed manifest still isn't an error (defaults stand, per §4.1) but a
//! parse failure is a real `serde_json::Error` logged at `warn` instead of
//! silently swallowed.

use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decoder::YoloVersion;

pub const MANIFEST_FILE: &str = "cira_model.json";
pub const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_INPUT_SIZE: u32 = 416;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub yolo_version: YoloVersionSetting,
    pub input_width: Option<u32>,
    pub input_height: Option<u32>,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub num_classes: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YoloVersionSetting {
    Auto,
    Fixed(YoloVersion),
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            yolo_version: YoloVersionSetting::Auto,
            input_width: None,
            input_height: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            num_classes: None,
        }
    }
}

impl ModelManifest {
    /// Reads `cira_model.json` from `dir` if present. Missing, oversized, or
    /// malformed manifests are not errors — defaults stand (§4.1) — but are
    /// logged so the operator can see what happened.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(MANIFEST_FILE);
        let Ok(meta) = std::fs::metadata(&path) else {
            return Self::default();
        };
        if meta.len() > MAX_MANIFEST_BYTES {
            tracing::warn!(
                path = %path.display(),
                size = meta.len(),
                "manifest exceeds {MAX_MANIFEST_BYTES} bytes, ignoring"
            );
            return Self::default();
        }

        let text = match read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed reading manifest");
                return Self::default();
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed manifest, using defaults");
                Self::default()
            }
        }
    }

    fn from_value(value: &Value) -> Self {
        let mut manifest = Self::default();

        if let Some(v) = value.get("yolo_version").and_then(Value::as_str) {
            manifest.yolo_version = parse_yolo_version(v);
        }

        // `input_size` sets both dimensions; explicit width/height win if
        // also present.
        if let Some(size) = value.get("input_size").and_then(Value::as_u64) {
            manifest.input_width = Some(size as u32);
            manifest.input_height = Some(size as u32);
        }
        if let Some(w) = value.get("input_width").and_then(Value::as_u64) {
            manifest.input_width = Some(w as u32);
        }
        if let Some(h) = value.get("input_height").and_then(Value::as_u64) {
            manifest.input_height = Some(h as u32);
        }
        if let Some(c) = value.get("confidence_threshold").and_then(Value::as_f64) {
            manifest.confidence_threshold = c as f32;
        }
        if let Some(n) = value.get("nms_threshold").and_then(Value::as_f64) {
            manifest.nms_threshold = n as f32;
        }
        if let Some(nc) = value.get("num_classes").and_then(Value::as_u64) {
            manifest.num_classes = Some(nc as u32);
        }

        manifest
    }
}

fn parse_yolo_version(s: &str) -> YoloVersionSetting {
    match s.to_ascii_lowercase().as_str() {
        "auto" => YoloVersionSetting::Auto,
        "v3" | "v4" => YoloVersionSetting::Fixed(YoloVersion::V3V4),
        "v5" | "v7" => YoloVersionSetting::Fixed(YoloVersion::V5V7),
        "v8" | "v9" | "v11" => YoloVersionSetting::Fixed(YoloVersion::V8Plus),
        "v10" => YoloVersionSetting::Fixed(YoloVersion::V10),
        _ => YoloVersionSetting::Auto,
    }
}
