use std::path::{Path, PathBuf};

pub const ACTIONGRAPH_DIR: &str = ".actiongraph";
pub const CONFIG_FILE: &str = ".actiongraph/config.yaml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Database file for `file_name` as configured in [`crate::config::EngineConfig`].
pub fn database_path(root: &Path, file_name: &str) -> PathBuf {
    root.join(ACTIONGRAPH_DIR).join(file_name)
}
