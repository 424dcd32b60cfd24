use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CURRENT_VERSION: u32 = 2;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("failed to write settings file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    #[default]
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Character-level query tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSettings {
    /// Hit-test tolerance in page units, applied on both axes
    pub hit_tolerance: f64,
    /// Line height as a multiple of the glyph's font size
    pub line_height_factor: f64,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            hit_tolerance: 5.0,
            line_height_factor: 1.2,
        }
    }
}

/// How glyph boxes are grouped into highlight rectangles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Top/bottom difference below which glyphs share a line
    pub line_tolerance: f64,
    /// Horizontal gap at which a new line is started
    pub line_break_gap: f64,
    /// Horizontal gap below which glyphs merge into one rectangle
    pub merge_gap: f64,
    pub pad_x: f64,
    pub pad_y: f64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            line_tolerance: 2.0,
            line_break_gap: 20.0,
            merge_gap: 5.0,
            pad_x: 1.0,
            pad_y: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub device_pixel_ratio: f64,
    /// Page size assumed before the native page is loaded
    pub placeholder_width: f64,
    pub placeholder_height: f64,
    /// Quiet period before a visibility change is acted on
    pub visibility_debounce_ms: u64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 2.0,
            placeholder_width: 552.0,
            placeholder_height: 751.0,
            visibility_debounce_ms: 100,
        }
    }
}

impl RendererSettings {
    #[must_use]
    pub fn visibility_debounce(&self) -> Duration {
        Duration::from_millis(self.visibility_debounce_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomSettings {
    pub default_scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Base of the exponential wheel zoom
    pub wheel_factor: f64,
    /// Multiplier for one zoom-in/zoom-out step
    pub step_factor: f64,
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self {
            default_scale: 1.0,
            min_scale: 0.25,
            max_scale: 5.0,
            wheel_factor: 1.005,
            step_factor: 1.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            poll_interval_ms: 100,
        }
    }
}

impl BootstrapSettings {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Engine configuration. Passed by value to whoever needs it; there is no
/// process-wide copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub text: TextSettings,

    #[serde(default)]
    pub selection: SelectionSettings,

    #[serde(default)]
    pub renderer: RendererSettings,

    #[serde(default)]
    pub zoom: ZoomSettings,

    #[serde(default)]
    pub bootstrap: BootstrapSettings,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            log_level: LogLevel::default(),
            text: TextSettings::default(),
            selection: SelectionSettings::default(),
            renderer: RendererSettings::default(),
            zoom: ZoomSettings::default(),
            bootstrap: BootstrapSettings::default(),
        }
    }
}

#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

impl EngineConfig {
    /// Parses a settings file, migrating older versions in memory.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: EngineConfig =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded settings from {path:?}");

        if config.version < CURRENT_VERSION {
            migrate_settings(&mut config);
        }
        Ok(config)
    }

    /// Loads settings, falling back to defaults when the file is missing or
    /// malformed. Never fails.
    #[must_use]
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };
        if !path.exists() {
            info!("Settings file not found at {path:?}, using defaults");
            return Self::default();
        }
        match Self::load_from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}; using default settings");
                Self::default()
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }
}

fn migrate_settings(config: &mut EngineConfig) {
    info!(
        "Migrating settings from v{} to v{}",
        config.version, CURRENT_VERSION
    );

    // v1 stored the wheel zoom base as a percentage step.
    if config.version < 2 && config.zoom.wheel_factor > 2.0 {
        config.zoom.wheel_factor = 1.0 + config.zoom.wheel_factor / 1000.0;
    }

    config.version = CURRENT_VERSION;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_yields_defaults() {
        let config: EngineConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.text.hit_tolerance, 5.0);
        assert_eq!(config.selection.merge_gap, 5.0);
        assert_eq!(config.bootstrap.max_attempts, 50);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = "selection:\n  line_tolerance: 3.5\nlog_level: warn\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.selection.line_tolerance, 3.5);
        assert_eq!(config.selection.line_break_gap, 20.0);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.log_level.to_level_filter(), LevelFilter::Warn);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);

        let mut config = EngineConfig::default();
        config.renderer.device_pixel_ratio = 1.0;
        config.zoom.max_scale = 8.0;
        config.save_to_path(&path).unwrap();

        let loaded = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn old_version_is_migrated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 1\nzoom:\n  wheel_factor: 5\n").unwrap();

        let loaded = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.version, CURRENT_VERSION);
        assert!((loaded.zoom.wheel_factor - 1.005).abs() < 1e-12);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "text: [not, a, map").unwrap();

        assert!(matches!(
            EngineConfig::load_from_path(&path),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(
            EngineConfig::load_or_default(Some(&path)),
            EngineConfig::default()
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        assert_eq!(
            EngineConfig::load_or_default(Some(&path)),
            EngineConfig::default()
        );
    }
}
