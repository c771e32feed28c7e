//! Configuration management module for the Raft node.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Node config file
//! 3. Environment variables (highest priority)
//!

mod cluster;
mod raft;
pub use cluster::*;
pub use raft::*;


//---
use std::path::Path;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NodeConfig {
    /// Cluster topology and node identity
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Core Raft algorithm parameters
    #[serde(default)]
    pub raft: RaftConfig,
}

impl NodeConfig {
    /// Load configuration from multiple sources with priority:
    /// 1. Defaults
    /// 2. Node config file
    /// 3. Environment variables
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a node-specific configuration file.
    ///   When absent, `config/node.{toml,yaml,...}` is picked up if it exists.
    ///
    /// # Returns
    /// Merged and validated configuration with proper priority ordering
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::builder();

        // 1. Node config file
        match config_path {
            Some(path) => {
                config = config.add_source(File::from(path).required(true));
            }
            None => {
                config = config.add_source(File::with_name("config/node").required(false));
            }
        }

        // 2. Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("RAFT")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: NodeConfig = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the whole configuration tree
    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        self.raft.validate()?;
        Ok(())
    }
}
