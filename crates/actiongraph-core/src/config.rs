use crate::error::{ActionError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Group whose actions every other group may use as children.
    #[serde(default = "default_shared_group")]
    pub shared_group: String,
    /// Upper bound on how deep loads and loop checks follow child edges.
    #[serde(default = "default_max_graph_depth")]
    pub max_graph_depth: usize,
    /// SQLite file name under `.actiongraph/`.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_version() -> u32 {
    1
}

fn default_shared_group() -> String {
    "shared.infra".to_string()
}

fn default_max_graph_depth() -> usize {
    64
}

fn default_database() -> String {
    "actions.db".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            shared_group: default_shared_group(),
            max_graph_depth: default_max_graph_depth(),
            database: default_database(),
        }
    }
}

impl EngineConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(ActionError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: EngineConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::write_atomic(&path, data.as_bytes())
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        paths::database_path(root, &self.database)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.shared_group.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "shared_group must not be empty".to_string(),
            });
        }

        if self.max_graph_depth == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_graph_depth=0 rejects every action with children".to_string(),
            });
        } else if self.max_graph_depth > 256 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "max_graph_depth={} (>256 is unusual)",
                    self.max_graph_depth
                ),
            });
        }

        if self.database.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "database file name must not be empty".to_string(),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = EngineConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.shared_group, "shared.infra");
        assert_eq!(parsed.max_graph_depth, 64);
        assert_eq!(parsed.version, 1);
    }

    #[test]
    fn sparse_yaml_uses_defaults() {
        let cfg: EngineConfig = serde_yaml::from_str("shared_group: public\n").unwrap();
        assert_eq!(cfg.shared_group, "public");
        assert_eq!(cfg.database, "actions.db");
        assert_eq!(cfg.max_graph_depth, 64);
    }

    #[test]
    fn load_without_init_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path()),
            Err(ActionError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig {
            max_graph_depth: 12,
            ..EngineConfig::default()
        };
        cfg.save(dir.path()).unwrap();
        let loaded = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.max_graph_depth, 12);
        assert_eq!(
            loaded.database_path(dir.path()),
            dir.path().join(".actiongraph/actions.db")
        );
    }

    #[test]
    fn validate_default_has_no_warnings() {
        assert!(EngineConfig::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_zero_and_huge_depth() {
        let zero = EngineConfig {
            max_graph_depth: 0,
            ..EngineConfig::default()
        };
        assert!(zero
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("max_graph_depth=0")));

        let huge = EngineConfig {
            max_graph_depth: 1000,
            ..EngineConfig::default()
        };
        assert!(huge
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains(">256 is unusual")));
    }

    #[test]
    fn validate_flags_empty_shared_group() {
        let cfg = EngineConfig {
            shared_group: " ".to_string(),
            ..EngineConfig::default()
        };
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("shared_group")));
    }
}
