use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, NodeIdentity, ProtocolConfig, Result};
use crate::network::LinkConfig;

/// Everything needed to bring up one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Link address of this node; random when not configured
    #[serde(with = "crate::core::serde::identity")]
    pub identity: NodeIdentity,

    /// Protocol timing
    pub protocol: ProtocolConfig,

    /// UDP link settings
    pub link: LinkConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            identity: NodeIdentity::random(),
            protocol: ProtocolConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parses and validates a JSON configuration
    pub fn from_json(text: &str) -> Result<Self> {
        let config: NodeConfig = serde_json::from_str(text)
            .map_err(|e| Error::config(format!("invalid node config: {e}")))?;
        config.protocol.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize node config: {e}")))
    }
}
