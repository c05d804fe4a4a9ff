//! User-facing configuration: window geometry, render pacing, card buffer sizing,
//! and shader search paths. Parsed from an optional TOML file; falls back to
//! compiled-in defaults when absent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub card_buffer: CardBufferConfig,
    pub shader: ShaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { width: 1280, height: 800, title: "yetty".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub target_fps: u32,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { target_fps: 60, clear_color: [0.0, 0.0, 0.0, 1.0] }
    }
}

/// Sizing knobs for the [`crate::card::CardBufferManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardBufferConfig {
    pub pool_32_slots: u32,
    pub pool_64_slots: u32,
    pub pool_128_slots: u32,
    pub pool_256_slots: u32,
    pub storage_capacity_bytes: u64,
    pub image_capacity_bytes: u64,
    /// Gap (in bytes) below which two adjacent dirty ranges are merged into one.
    pub dirty_max_gap: u64,
    /// Side length in pixels of the shared square image atlas texture.
    pub image_atlas_size: u32,
}

impl Default for CardBufferConfig {
    fn default() -> Self {
        Self {
            pool_32_slots: 4096,
            pool_64_slots: 2048,
            pool_128_slots: 1024,
            pool_256_slots: 512,
            storage_capacity_bytes: 16 * 1024 * 1024,
            image_capacity_bytes: 64 * 1024 * 1024,
            dirty_max_gap: 64,
            image_atlas_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Extra directories searched for shader library `.wgsl` files, in addition to
    /// the built-in set, merged alphabetically by file stem.
    pub library_dirs: Vec<PathBuf>,
    /// Extra directories searched for widget effect providers.
    pub effect_dirs: Vec<PathBuf>,
}

/// Return the platform-specific configuration directory for this application.
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("yetty");
        }
        PathBuf::from(".").join("yetty")
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("yetty");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join("yetty");
        }
        PathBuf::from(".").join("yetty")
    }
}

/// Return the path to the default config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl Config {
    /// Load config from the default path, falling back to defaults if the file is
    /// missing or fails to parse. Parse failures are logged, never propagated —
    /// use [`Config::try_load`] when the distinction matters to the caller.
    pub fn load() -> Self {
        let path = config_path();
        match Self::load_from(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if !matches!(&e, Error::NotFound { .. }) {
                    tracing::warn!(target: "yetty.config", error = %crate::error::chain_to_string(&e), "using defaults");
                }
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. Distinguishes "file missing" (`NotFound`)
    /// from "parse error" (`InvalidArgument` with the `toml` error chained) so
    /// callers can decide whether to keep a previously-loaded config.
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("config file not found: {}", path.display()))
            } else {
                Error::io_failure(format!("failed to read {}: {e}", path.display()))
            }
        })?;
        toml::from_str(&data).map_err(|e| {
            Error::invalid_argument(format!("parse error in {}", path.display()))
                .with_source(Error::invalid_argument(e.to_string()))
        })
    }

    /// Save config to the default path, creating the config directory if needed.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::io_failure(format!("failed to create {}: {e}", dir.display())))?;
        let path = config_path();
        let data = toml::to_string_pretty(self)
            .map_err(|e| Error::internal_bug(format!("config serialize error: {e}")))?;
        std::fs::write(&path, data)
            .map_err(|e| Error::io_failure(format!("failed to write {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.render.target_fps, 60);
        assert_eq!(cfg.card_buffer.dirty_max_gap, 64);
        assert!(cfg.shader.library_dirs.is_empty());
    }

    #[test]
    fn load_from_missing_path_is_not_found() {
        let err = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn load_from_malformed_toml_is_invalid_argument() {
        let dir = std::env::temp_dir().join(format!("yetty-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn roundtrips_through_toml() {
        let mut cfg = Config::default();
        cfg.window.title = "custom".to_string();
        cfg.card_buffer.pool_32_slots = 10;
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.window.title, "custom");
        assert_eq!(back.card_buffer.pool_32_slots, 10);
    }
}
