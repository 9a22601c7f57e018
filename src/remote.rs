//! Boundary to the remote command-execution layer.

use async_trait::async_trait;

use crate::error::Result;

/// A set of hosts addressed by their short names, joined into the pattern
/// syntax the execution layer fans out over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    hosts: Vec<String>,
}

impl ExecTarget {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn pattern(&self) -> String {
        self.hosts.join(",")
    }
}

impl std::fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern())
    }
}

/// A command to fan out. `safe` marks read-only commands that may run even
/// in dry-run mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub line: String,
    pub safe: bool,
}

impl Command {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into(), safe: false }
    }

    pub fn safe(line: impl Into<String>) -> Self {
        Self { line: line.into(), safe: true }
    }
}

/// Remote execution collaborator. A blocking barrier per batch: the call
/// returns only once every targeted host has finished or failed.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, target: &ExecTarget, command: &Command) -> Result<()>;
}
