//! Codec configuration
//!
//! Settings come from (lowest to highest priority) built-in defaults, an
//! optional JSON file, and `NV12_MJPEG_*` environment variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::error::{CodecError, Result};

pub const ENV_BACKEND: &str = "NV12_MJPEG_BACKEND";
pub const ENV_FPS: &str = "NV12_MJPEG_FPS";
pub const ENV_HW_DEVICE: &str = "NV12_MJPEG_HW_DEVICE";
pub const ENV_FALLBACK: &str = "NV12_MJPEG_FALLBACK";
pub const ENV_THREADS: &str = "NV12_MJPEG_THREADS";

/// Codec implementation behind a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Rockchip MPP via FFmpeg `mjpeg_rkmpp`
    Rkmpp,
    /// libjpeg-turbo (software)
    Turbo,
}

impl BackendKind {
    /// Whether this build carries the backend at all
    pub fn is_compiled(&self) -> bool {
        match self {
            BackendKind::Rkmpp => cfg!(feature = "rkmpp"),
            BackendKind::Turbo => true,
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, BackendKind::Rkmpp)
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "rkmpp") {
            BackendKind::Rkmpp
        } else {
            BackendKind::Turbo
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Rkmpp => write!(f, "rkmpp"),
            BackendKind::Turbo => write!(f, "turbo"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rkmpp" | "mpp" | "hw" | "hardware" => Ok(BackendKind::Rkmpp),
            "turbo" | "turbojpeg" | "sw" | "software" => Ok(BackendKind::Turbo),
            other => Err(CodecError::InvalidParameter(format!(
                "unknown backend: {}",
                other
            ))),
        }
    }
}

/// Codec configuration shared by one-shot calls and persistent contexts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Backend used for new contexts
    pub backend: BackendKind,
    /// Nominal frame rate written to the codec time base
    pub frame_rate: u32,
    /// Attach an RKMPP hardware device context to decoders
    pub attach_hw_device: bool,
    /// Let one-shot calls use the software backend when the hardware is missing
    pub software_fallback: bool,
    /// Codec worker threads (FFmpeg only)
    pub thread_count: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            frame_rate: 30,
            attach_hw_device: false,
            software_fallback: true,
            thread_count: 1,
        }
    }
}

impl CodecConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a JSON file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config: CodecConfig = serde_json::from_str(&text).map_err(|e| {
            CodecError::InvalidParameter(format!(
                "invalid config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.apply_env();
        Ok(config)
    }

    /// Software backend with defaults otherwise
    pub fn software() -> Self {
        Self {
            backend: BackendKind::Turbo,
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Apply `NV12_MJPEG_*` overrides; malformed values are ignored with a warning
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_BACKEND) {
            match value.parse() {
                Ok(backend) => self.backend = backend,
                Err(e) => warn!("Ignoring {}: {}", ENV_BACKEND, e),
            }
        }
        if let Some(value) = lookup(ENV_FPS) {
            match value.trim().parse::<u32>() {
                Ok(fps) if fps > 0 => self.frame_rate = fps,
                _ => warn!("Ignoring {}={}", ENV_FPS, value),
            }
        }
        if let Some(value) = lookup(ENV_HW_DEVICE) {
            match parse_bool(&value) {
                Some(flag) => self.attach_hw_device = flag,
                None => warn!("Ignoring {}={}", ENV_HW_DEVICE, value),
            }
        }
        if let Some(value) = lookup(ENV_FALLBACK) {
            match parse_bool(&value) {
                Some(flag) => self.software_fallback = flag,
                None => warn!("Ignoring {}={}", ENV_FALLBACK, value),
            }
        }
        if let Some(value) = lookup(ENV_THREADS) {
            match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => self.thread_count = n,
                _ => warn!("Ignoring {}={}", ENV_THREADS, value),
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_backend_parse() {
        assert_eq!("rkmpp".parse::<BackendKind>().unwrap(), BackendKind::Rkmpp);
        assert_eq!("TurboJPEG".parse::<BackendKind>().unwrap(), BackendKind::Turbo);
        assert!("nvenc".parse::<BackendKind>().is_err());
        assert!(BackendKind::Turbo.is_compiled());
    }

    #[test]
    fn test_json_defaults() {
        let config: CodecConfig = serde_json::from_str(r#"{"backend":"turbo"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Turbo);
        assert_eq!(config.frame_rate, 30);
        assert!(config.software_fallback);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BACKEND, "software"),
            (ENV_FPS, "60"),
            (ENV_HW_DEVICE, "yes"),
            (ENV_FALLBACK, "maybe"),
        ]
        .into_iter()
        .collect();

        let mut config = CodecConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.backend, BackendKind::Turbo);
        assert_eq!(config.frame_rate, 60);
        assert!(config.attach_hw_device);
        // Malformed value leaves the default
        assert!(config.software_fallback);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codec.json");
        std::fs::write(&path, r#"{"frame_rate": 25, "thread_count": 2}"#).unwrap();
        let config = CodecConfig::load(&path).unwrap();
        assert_eq!(config.frame_rate, 25);
        assert_eq!(config.thread_count, 2);

        std::fs::write(&path, "not json").unwrap();
        assert!(CodecConfig::load(&path).is_err());
    }
}
