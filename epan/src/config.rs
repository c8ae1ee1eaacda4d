use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits and switches for an [`Epan`](crate::Epan) instance.
///
/// Missing keys take their default values when deserialized.
///
/// ```rust
/// let config = epan::EngineConfig::from_json_str(r#"{ "max_depth": 8 }"#).unwrap();
/// assert_eq!(config.max_depth, 8);
/// assert!(config.build_tree);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum nesting of dissector calls per packet, the frame dissector included.
    pub max_depth: usize,
    /// Maximum number of nodes in one packet's tree.
    pub max_tree_items: usize,
    /// When false, dissection only validates and fills packet info.
    pub build_tree: bool,
    /// Hand undissected payloads to the built-in `data` dissector.
    pub data_fallback: bool,
    /// Include hidden items when rendering trees.
    pub show_hidden: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_depth: 32,
            max_tree_items: 1_000_000,
            build_tree: true,
            data_fallback: true,
            show_hidden: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("`{field}` must be at least {min}")]
    TooSmall { field: &'static str, min: usize },
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth < 1 {
            return Err(ConfigError::TooSmall {
                field: "max_depth",
                min: 1,
            });
        }
        if self.max_tree_items < 1 {
            return Err(ConfigError::TooSmall {
                field: "max_tree_items",
                min: 1,
            });
        }
        Ok(())
    }
}
