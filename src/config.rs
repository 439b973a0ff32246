//! Configuration for hapticd
//!
//! Stored as TOML at `~/.config/hapticd/config.toml` (or the platform config
//! directory). Missing fields fall back to their defaults, so a partial file
//! is valid. Values are range-checked on load.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Config directory name below the platform config dir
pub const CONFIG_DIR: &str = "hapticd";

/// Config file name
pub const CONFIG_FILE: &str = "config.toml";

const MIN_TIME_MS: u64 = 10;
const MAX_TIME_MS: u64 = 3000;
const MIN_INTENSITY: f32 = 0.05;
const MAX_INTENSITY: f32 = 1.0;
const MAX_MINIMUM_DAMAGE: u32 = 10_000;

/// Configuration shared between the trigger layer and whoever reloads it
pub type SharedConfig = Arc<RwLock<HapticConfig>>;

pub fn new_shared_config(config: HapticConfig) -> SharedConfig {
    Arc::new(RwLock::new(config))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
}

// ============================================================================
// Sections
// ============================================================================

/// Vibration scaled by how much health is missing
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Strength at zero health
    pub max_intensity: f32,
    /// Strength at full health
    pub min_intensity: f32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_intensity: 0.6,
            min_intensity: 0.0,
        }
    }
}

/// Vibration when the player takes a hit
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DamageConfig {
    pub enabled: bool,
    /// Always use `intensity` instead of scaling with the damage taken
    pub static_strength: bool,
    pub intensity: f32,
    /// Hits below this are ignored
    pub minimum_damage: u32,
    pub duration_ms: u64,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            static_strength: true,
            intensity: 0.5,
            minimum_damage: 0,
            duration_ms: 600,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeathConfig {
    pub enabled: bool,
    pub intensity: f32,
    /// Use `duration_ms` instead of the respawn timer
    pub static_length: bool,
    pub duration_ms: u64,
}

impl Default for DeathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            intensity: 0.7,
            static_length: true,
            duration_ms: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PotionConfig {
    pub enabled: bool,
    pub intensity: f32,
    pub duration_ms: u64,
}

impl Default for PotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            intensity: 0.4,
            duration_ms: 400,
        }
    }
}

/// Pulsing vibration while a damage-over-time debuff is active
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DebuffConfig {
    pub enabled: bool,
    pub max_intensity: f32,
    pub min_intensity: f32,
    /// Length of one high or low half of the pulse
    pub delay_ms: u64,
}

impl Default for DebuffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_intensity: 0.45,
            min_intensity: 0.2,
            delay_ms: 500,
        }
    }
}

// ============================================================================
// Root
// ============================================================================

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HapticConfig {
    /// Master switch for every trigger
    pub enabled: bool,
    /// Scale applied to every strength before it reaches a device
    pub max_intensity: f32,
    pub health: HealthConfig,
    pub damage: DamageConfig,
    pub death: DeathConfig,
    pub potion: PotionConfig,
    pub debuff: DebuffConfig,
}

impl Default for HapticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_intensity: 1.0,
            health: HealthConfig::default(),
            damage: DamageConfig::default(),
            death: DeathConfig::default(),
            potion: PotionConfig::default(),
            debuff: DebuffConfig::default(),
        }
    }
}

fn check_range<T: PartialOrd + Display>(
    field: &'static str,
    value: T,
    min: T,
    max: T,
) -> Result<(), ConfigError> {
    // written so NaN fails the check
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        })
    }
}

impl HapticConfig {
    /// Checks every value against its allowed range, reporting the first
    /// violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_intensity", self.max_intensity, 0.0, MAX_INTENSITY)?;

        check_range("health.max_intensity", self.health.max_intensity, MIN_INTENSITY, MAX_INTENSITY)?;
        check_range("health.min_intensity", self.health.min_intensity, 0.0, MAX_INTENSITY)?;

        check_range("damage.intensity", self.damage.intensity, MIN_INTENSITY, MAX_INTENSITY)?;
        check_range("damage.minimum_damage", self.damage.minimum_damage, 0, MAX_MINIMUM_DAMAGE)?;
        check_range("damage.duration_ms", self.damage.duration_ms, MIN_TIME_MS, MAX_TIME_MS)?;

        check_range("death.intensity", self.death.intensity, MIN_INTENSITY, MAX_INTENSITY)?;
        check_range("death.duration_ms", self.death.duration_ms, MIN_TIME_MS, MAX_TIME_MS)?;

        check_range("potion.intensity", self.potion.intensity, MIN_INTENSITY, MAX_INTENSITY)?;
        check_range("potion.duration_ms", self.potion.duration_ms, MIN_TIME_MS, MAX_TIME_MS)?;

        check_range("debuff.max_intensity", self.debuff.max_intensity, MIN_INTENSITY, MAX_INTENSITY)?;
        check_range("debuff.min_intensity", self.debuff.min_intensity, MIN_INTENSITY, MAX_INTENSITY)?;
        check_range("debuff.delay_ms", self.debuff.delay_ms, MIN_TIME_MS, MAX_TIME_MS)?;

        Ok(())
    }

    /// Parses and validates TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: HapticConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads and validates the config at `path`.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Loads `path`, falling back to defaults when it is missing or invalid.
    pub async fn load_or_default(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(config) => {
                info!("Configuration loaded from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Writes the config as pretty TOML, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = self.to_toml()?;
        tokio::fs::write(path, content).await.map_err(io_err)?;
        debug!("Config written to {:?}", path);
        Ok(())
    }

    /// Writes a default config to `path` unless a file already exists there.
    ///
    /// Returns whether a file was written.
    pub async fn ensure_default(path: &Path) -> Result<bool, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            return Ok(false);
        }

        info!("No config at {:?}, writing defaults", path);
        Self::default().save(path).await?;
        Ok(true)
    }
}

/// `<config dir>/hapticd/config.toml`
pub fn default_config_path() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
    base.join(CONFIG_DIR).join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HapticConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enabled);
        assert_eq!(config.max_intensity, 1.0);
        assert!(!config.health.enabled);
        assert_eq!(config.damage.duration_ms, 600);
        assert_eq!(config.death.intensity, 0.7);
        assert_eq!(config.potion.duration_ms, 400);
        assert_eq!(config.debuff.delay_ms, 500);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = HapticConfig::from_toml(
            r#"
            max_intensity = 0.8

            [damage]
            static_strength = false
            "#,
        )
        .unwrap();

        assert_eq!(config.max_intensity, 0.8);
        assert!(!config.damage.static_strength);
        assert_eq!(config.damage.duration_ms, 600);
        assert_eq!(config.death, DeathConfig::default());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut config = HapticConfig::default();
        config.debuff.delay_ms = 5;
        match config.validate() {
            Err(ConfigError::OutOfRange { field, .. }) => assert_eq!(field, "debuff.delay_ms"),
            other => panic!("expected OutOfRange, got {:?}", other),
        }

        let mut config = HapticConfig::default();
        config.death.intensity = 1.2;
        assert!(config.validate().is_err());

        let mut config = HapticConfig::default();
        config.max_intensity = f32::NAN;
        assert!(config.validate().is_err());

        // health may go all the way down to zero at full health
        let mut config = HapticConfig::default();
        config.health.min_intensity = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_reports_parse_error() {
        let result = HapticConfig::from_toml("enabled = \"maybe\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = HapticConfig::default();
        config.health.enabled = true;
        config.debuff.max_intensity = 0.9;
        config.save(&path).await.unwrap();

        let loaded = HapticConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_ensure_default_only_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        assert!(HapticConfig::ensure_default(&path).await.unwrap());
        let mut custom = HapticConfig::default();
        custom.enabled = false;
        custom.save(&path).await.unwrap();

        assert!(!HapticConfig::ensure_default(&path).await.unwrap());
        assert!(!HapticConfig::load(&path).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            HapticConfig::load(&path).await,
            Err(ConfigError::Io { .. })
        ));
        assert_eq!(
            HapticConfig::load_or_default(&path).await,
            HapticConfig::default()
        );
    }

    #[test]
    fn test_default_path_ends_with_app_file() {
        let path = default_config_path();
        assert!(path.ends_with(Path::new(CONFIG_DIR).join(CONFIG_FILE)));
    }
}
