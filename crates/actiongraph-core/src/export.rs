use std::fmt;
use std::str::FromStr;

use crate::error::{ActionError, Result};
use crate::model::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl Format {
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Yaml => "application/x-yaml",
            Format::Json => "application/json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Yaml => "yaml",
            Format::Json => "json",
        })
    }
}

impl FromStr for Format {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            other => Err(ActionError::InvalidInput(format!(
                "unknown export format '{other}' (expected yaml or json)"
            ))),
        }
    }
}

/// Serialises a fully aggregated action.
pub fn export_action(action: &Action, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Yaml => Ok(serde_yaml::to_string(action)?.into_bytes()),
        Format::Json => Ok(serde_json::to_vec_pretty(action)?),
    }
}
