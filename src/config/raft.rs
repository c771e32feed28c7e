use std::fmt::Debug;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Configuration parameters for the Raft consensus engine
#[derive(Serialize, Deserialize, Clone)]
pub struct RaftConfig {
    /// Configuration settings for the leader election mechanism
    /// Controls the randomized election timeout window
    #[serde(default)]
    pub election: ElectionConfig,

    /// Configuration settings related to log replication
    /// Includes the heartbeat cadence and per-message entry limits
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Configuration settings for commit application handling
    /// Controls how committed log entries are applied to the state machine
    #[serde(default)]
    pub commit: CommitConfig,
}

impl Debug for RaftConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftConfig").finish()
    }
}
impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election: ElectionConfig::default(),
            replication: ReplicationConfig::default(),
            commit: CommitConfig::default(),
        }
    }
}
impl RaftConfig {
    /// Validates all Raft subsystem configurations
    pub fn validate(&self) -> Result<()> {
        self.election.validate()?;
        self.replication.validate()?;
        self.commit.validate()?;

        if self.replication.heartbeat_interval_ms >= self.election.election_timeout_min_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "heartbeat_interval_ms {}ms must be less than election_timeout_min_ms {}ms",
                self.replication.heartbeat_interval_ms, self.election.election_timeout_min_ms
            ))));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    /// Lower bound (in milliseconds) of the randomized election timeout window
    #[serde(default = "default_election_timeout_min")]
    pub election_timeout_min_ms: u64,

    /// Upper bound (in milliseconds) of the randomized election timeout window
    #[serde(default = "default_election_timeout_max")]
    pub election_timeout_max_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_timeout_min_ms: default_election_timeout_min(),
            election_timeout_max_ms: default_election_timeout_max(),
        }
    }
}
impl ElectionConfig {
    fn validate(&self) -> Result<()> {
        if self.election_timeout_min_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "election_timeout_min_ms cannot be 0".into(),
            )));
        }

        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "election_timeout_min_ms {}ms must be less than election_timeout_max_ms {}ms",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            ))));
        }

        Ok(())
    }
}
fn default_election_timeout_min() -> u64 {
    500
}
fn default_election_timeout_max() -> u64 {
    1000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicationConfig {
    /// Interval (in milliseconds) between leader heartbeat rounds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Maximum number of log entries carried by a single AppendEntries message
    #[serde(default = "default_max_entries_per_append")]
    pub max_entries_per_append: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            max_entries_per_append: default_max_entries_per_append(),
        }
    }
}
impl ReplicationConfig {
    fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "heartbeat_interval_ms cannot be 0".into(),
            )));
        }

        if self.max_entries_per_append == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_entries_per_append must be > 0".into(),
            )));
        }

        Ok(())
    }
}
fn default_heartbeat_interval() -> u64 {
    100
}
fn default_max_entries_per_append() -> u64 {
    100
}

/// Commit handler-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommitConfig {
    /// Number of accumulated commit signals that forces an immediate apply round
    #[serde(default = "default_batch_size_threshold")]
    pub batch_size_threshold: u64,

    /// Interval (in milliseconds) between periodic apply rounds
    #[serde(default = "default_process_interval_ms")]
    pub process_interval_ms: u64,
}
impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            batch_size_threshold: default_batch_size_threshold(),
            process_interval_ms: default_process_interval_ms(),
        }
    }
}
impl CommitConfig {
    fn validate(&self) -> Result<()> {
        if self.batch_size_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "batch_size_threshold must be > 0".into(),
            )));
        }

        if self.process_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "process_interval_ms must be > 0".into(),
            )));
        }

        Ok(())
    }
}
fn default_batch_size_threshold() -> u64 {
    100
}
fn default_process_interval_ms() -> u64 {
    10
}
