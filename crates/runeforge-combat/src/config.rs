//! Combat configuration.
//!
//! Tunables for mitigation, crits, ability buffs and the runtime. Loaded from
//! TOML; every field has a default so partial files are valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from strict configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written.
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    /// File content is not a valid config.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Config could not be serialized.
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Combat configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    // === Mitigation ===
    /// Armor scaling constant: reduction = armor / (armor + scaling).
    pub armor_scaling: f32,
    /// Lowest resistance in percent (-100 doubles damage).
    pub resist_min: f32,
    /// Highest resistance in percent (90 leaves 10%).
    pub resist_max: f32,

    // === Attacker bonuses ===
    /// Damage multiplier per strength point; 0 disables strength scaling.
    pub strength_scaling: f32,

    // === Criticals ===
    /// Stat adding crit chance per point, if any.
    pub crit_secondary_stat: Option<String>,
    /// Crit chance (0.0-1.0) added per point of the secondary stat.
    pub crit_chance_per_point: f32,

    // === Stats ===
    /// Base changes smaller than this are not announced.
    pub change_epsilon: f32,

    // === Abilities and effects ===
    /// Ordering tier of modifiers granted by abilities.
    pub ability_buff_order: i32,
    /// Default DoT tick interval in seconds.
    pub dot_tick_interval: f64,

    // === Runtime ===
    /// Maximum nesting of commands spawned by procs and hooks.
    pub max_command_depth: u32,
    /// Event bus capacity.
    pub event_bus_capacity: usize,
    /// Seed for chance rolls (None = random).
    pub rng_seed: Option<u64>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            armor_scaling: 100.0,
            resist_min: -100.0,
            resist_max: 90.0,

            strength_scaling: 0.0,

            crit_secondary_stat: None,
            crit_chance_per_point: 0.0,

            change_epsilon: 1.0e-4,

            ability_buff_order: 100,
            dot_tick_interval: 1.0,

            max_command_depth: 8,
            event_bus_capacity: 1024,
            rng_seed: None,
        }
    }
}

impl CombatConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Combat config not found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded combat config from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("Failed to parse combat config: {e}");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to read combat config: {e}");
                Self::default()
            },
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents)?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        info!("Saved combat config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // Mitigation
        self.armor_scaling = if self.armor_scaling.is_finite() {
            self.armor_scaling.max(1.0)
        } else {
            100.0
        };
        self.resist_min = self.resist_min.clamp(-1000.0, 0.0);
        self.resist_max = self.resist_max.clamp(0.0, 100.0);

        // Bonuses
        self.strength_scaling = self.strength_scaling.clamp(0.0, 1.0);
        self.crit_chance_per_point = self.crit_chance_per_point.clamp(0.0, 1.0);
        self.change_epsilon = self.change_epsilon.abs();

        // Runtime
        self.dot_tick_interval = self.dot_tick_interval.clamp(0.05, 60.0);
        self.max_command_depth = self.max_command_depth.clamp(1, 64);
        self.event_bus_capacity = self.event_bus_capacity.clamp(16, 1 << 20);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CombatConfig::default();
        assert_eq!(config.armor_scaling, 100.0);
        assert_eq!(config.resist_min, -100.0);
        assert_eq!(config.resist_max, 90.0);
        assert_eq!(config.strength_scaling, 0.0);
        assert!(config.rng_seed.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CombatConfig::default();
        config.armor_scaling = -5.0;
        config.resist_max = 150.0;
        config.max_command_depth = 0;
        config.dot_tick_interval = 0.0;

        config.validate();

        assert_eq!(config.armor_scaling, 1.0);
        assert_eq!(config.resist_max, 100.0);
        assert_eq!(config.max_command_depth, 1);
        assert!((config.dot_tick_interval - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CombatConfig::from_toml_str("strength_scaling = 0.01\nrng_seed = 7\n")
            .expect("valid config");
        assert!((config.strength_scaling - 0.01).abs() < 1e-6);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.ability_buff_order, 100);
    }

    #[test]
    fn test_strict_parse_rejects_garbage() {
        assert!(matches!(
            CombatConfig::from_toml_str("armor_scaling = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("combat.toml");

        let mut config = CombatConfig::default();
        config.armor_scaling = 150.0;
        config.crit_secondary_stat = Some("luck".to_string());
        config.rng_seed = Some(99);
        config.save_to(&config_path).expect("Failed to save config");

        let loaded = CombatConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_or_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("missing.toml");
        assert_eq!(CombatConfig::load_from(&missing), CombatConfig::default());

        let broken = temp_dir.path().join("broken.toml");
        fs::write(&broken, "this is = = not toml").expect("write");
        assert_eq!(CombatConfig::load_from(&broken), CombatConfig::default());
    }
}
