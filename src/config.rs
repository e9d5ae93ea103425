// src/config.rs

//! Defines the configuration structures for `core-view`.
//!
//! The configuration is deserialized from a JSON file and loaded once into
//! [`CONFIG`]. Every section carries `#[serde(default)]`, so a file only needs
//! to mention the values it wants to change. Command-line flags are applied on
//! top of the loaded values in `main.rs`.

use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that points at an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "CORE_VIEW_CONFIG";

/// Number of images skipped by `JumpForward` / `JumpBackward`.
pub const DEFAULT_JUMP_DISTANCE: usize = 10;

/// Default size of the viewer window for windowed backends.
pub const DEFAULT_WINDOW_WIDTH: u32 = 1024;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 768;

/// Upper bound for a single remote image download.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Global configuration, loaded on first access.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::load_or_default);

// --- Top-Level Configuration Structure ---

/// Represents the complete configuration for the viewer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window geometry for windowed backends.
    pub window: WindowConfig,
    /// Navigation behavior.
    pub navigation: NavigationConfig,
    /// Scaling and compositing behavior.
    pub render: RenderConfig,
    /// Surface backend selection and device paths.
    pub display: DisplayConfig,
    /// Remote source fetching.
    pub network: NetworkConfig,
}

impl Config {
    /// Loads the configuration file if one exists, falling back to defaults.
    ///
    /// A malformed file is not fatal: the problem is logged and defaults are used.
    pub fn load_or_default() -> Config {
        let Some(path) = config_file_path() else {
            debug!("No configuration directory found; using defaults.");
            return Config::default();
        };
        if !path.exists() {
            debug!("No configuration file at {}; using defaults.", path.display());
            return Config::default();
        }
        match Config::from_file(&path) {
            Ok(config) => {
                debug!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring configuration file {}: {:#}", path.display(), e);
                Config::default()
            }
        }
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: &Path) -> anyhow::Result<Config> {
        use anyhow::Context;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Config::from_json(&text)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(text: &str) -> anyhow::Result<Config> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Resolves the configuration file location.
///
/// Order: `$CORE_VIEW_CONFIG`, `$XDG_CONFIG_HOME/core-view/config.json`,
/// `$HOME/.config/core-view/config.json`.
fn config_file_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(explicit));
    }
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("core-view").join("config.json"))
}

// --- Window Configuration ---

/// Initial and minimum window size in pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
            min_width: 320,
            min_height: 240,
        }
    }
}

// --- Navigation Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NavigationConfig {
    /// Step size for the jump commands. Values below 1 are treated as 1.
    pub jump_distance: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        NavigationConfig {
            jump_distance: DEFAULT_JUMP_DISTANCE,
        }
    }
}

// --- Render Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// If true, images smaller than the surface are enlarged to fit it.
    pub allow_upscale: bool,
    /// Color of the area around the image, as `[r, g, b]`.
    pub background: [u8; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            allow_upscale: false,
            background: [0, 0, 0],
        }
    }
}

// --- Display Configuration ---

/// Which surface backend to open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Probe the environment (compositor, then mode-setting, then framebuffer).
    #[default]
    Auto,
    X11,
    Drm,
    Framebuffer,
    Native,
}

impl std::str::FromStr for BackendChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "x11" => Ok(BackendChoice::X11),
            "drm" | "kms" => Ok(BackendChoice::Drm),
            "framebuffer" | "fb" | "fbdev" => Ok(BackendChoice::Framebuffer),
            "native" => Ok(BackendChoice::Native),
            other => Err(format!(
                "unknown backend '{}' (expected auto, x11, drm, framebuffer or native)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub backend: BackendChoice,
    /// Try MIT-SHM for the X11 backend before falling back to `XPutImage`.
    pub x11_shared_memory: bool,
    /// DRM card device node.
    pub drm_card: PathBuf,
    /// Linux framebuffer device node. `$FRAMEBUFFER` takes precedence.
    pub framebuffer_device: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            backend: BackendChoice::Auto,
            x11_shared_memory: true,
            drm_card: PathBuf::from("/dev/dri/card0"),
            framebuffer_device: PathBuf::from("/dev/fb0"),
        }
    }
}

// --- Network Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Remote images larger than this are rejected.
    pub max_download_bytes: u64,
    /// Global timeout for a single fetch.
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.navigation.jump_distance, DEFAULT_JUMP_DISTANCE);
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 768);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_json(
            r#"{ "navigation": { "jump_distance": 5 }, "display": { "backend": "framebuffer" } }"#,
        )
        .unwrap();
        assert_eq!(config.navigation.jump_distance, 5);
        assert_eq!(config.display.backend, BackendChoice::Framebuffer);
        assert!(config.display.x11_shared_memory);
        assert_eq!(config.render, RenderConfig::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Config::from_json("{ not json").is_err());
    }

    #[test]
    fn backend_choice_parses_aliases() {
        assert_eq!("KMS".parse::<BackendChoice>(), Ok(BackendChoice::Drm));
        assert_eq!("fbdev".parse::<BackendChoice>(), Ok(BackendChoice::Framebuffer));
        assert!("wayland".parse::<BackendChoice>().is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "render": { "allow_upscale": true } }"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert!(config.render.allow_upscale);
    }
}
