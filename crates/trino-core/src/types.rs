//! Shared enums used across the Trino operator crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string does not name a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} {value:?}, expected one of: {expected}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Role of this application in the query-engine cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Coordinator,
    Worker,
    /// Single application acting as coordinator and worker.
    All,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Coordinator => "coordinator",
            NodeRole::Worker => "worker",
            NodeRole::All => "all",
        }
    }

    /// Whether this role owns the catalog configuration and discovery URI.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, NodeRole::Coordinator | NodeRole::All)
    }
}

impl FromStr for NodeRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" => Ok(NodeRole::Coordinator),
            "worker" => Ok(NodeRole::Worker),
            "all" => Ok(NodeRole::All),
            _ => Err(ParseEnumError {
                kind: "charm function",
                value: s.to_string(),
                expected: "coordinator, worker, all",
            }),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workload log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ParseEnumError {
                kind: "log level",
                value: s.to_string(),
                expected: "info, debug, warn, error",
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default access mode of the file-based access control rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclMode {
    All,
    None,
}

impl AclMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclMode::All => "all",
            AclMode::None => "none",
        }
    }
}

impl FromStr for AclMode {
    type Err = ParseEnumError;

    // Exact match only: "ALL" is not a valid mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(AclMode::All),
            "none" => Ok(AclMode::None),
            _ => Err(ParseEnumError {
                kind: "acl mode",
                value: s.to_string(),
                expected: "all, none",
            }),
        }
    }
}

impl fmt::Display for AclMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
