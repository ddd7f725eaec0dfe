//! Workload container access.
//!
//! The operator never runs the engine itself; it writes files into the
//! workload container, runs helper commands there and hands the service
//! manager a plan. [`Workload`] is that seam. [`LocalWorkload`] maps the
//! container filesystem onto a local directory and journals commands,
//! restarts and replans instead of executing them.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub type WorkloadResult<T> = Result<T, WorkloadError>;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("workload container is not reachable")]
    NotConnected,

    #[error("invalid container path {0:?}")]
    InvalidPath(String),

    #[error("i/o error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("command `{command}` failed: {reason}")]
    Exec { command: String, reason: String },

    #[error("malformed service plan: {0}")]
    Plan(String),
}

/// The service definition handed to the workload's service manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub summary: String,
    pub command: String,
    pub startup: String,
    pub environment: BTreeMap<String, String>,
}

pub trait Workload: Send + Sync {
    fn can_connect(&self) -> bool;

    /// Write `content` to `path`, creating parent directories.
    fn push(&self, path: &str, content: &str) -> WorkloadResult<()>;

    /// Read a file; `None` when it does not exist.
    fn pull(&self, path: &str) -> WorkloadResult<Option<String>>;

    fn exists(&self, path: &str) -> WorkloadResult<bool>;

    /// Remove a file, or a directory when `recursive` is set. Returns
    /// whether anything was removed.
    fn remove_path(&self, path: &str, recursive: bool) -> WorkloadResult<bool>;

    /// File names directly under `path`, sorted. Empty when the directory
    /// does not exist.
    fn list_dir(&self, path: &str) -> WorkloadResult<Vec<String>>;

    fn exec(&self, command: &[&str]) -> WorkloadResult<()>;

    /// Currently applied plan, if any.
    fn plan(&self) -> WorkloadResult<Option<ServicePlan>>;

    /// Apply `plan` and restart the service.
    fn replan(&self, plan: &ServicePlan) -> WorkloadResult<()>;

    fn restart(&self) -> WorkloadResult<()>;
}

// ── Local directory implementation ────────────────────────────────

const JOURNAL_FILE: &str = ".journal";
const PLAN_FILE: &str = ".plan.json";

/// A workload whose container filesystem lives under `root`.
pub struct LocalWorkload {
    root: PathBuf,
    connected: AtomicBool,
}

fn io_err(path: &Path, e: std::io::Error) -> WorkloadError {
    WorkloadError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl LocalWorkload {
    pub fn new(root: &Path) -> WorkloadResult<Self> {
        fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            connected: AtomicBool::new(true),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Simulate the container becoming (un)reachable.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Commands, restarts and replans performed so far, one per line.
    pub fn journal(&self) -> WorkloadResult<Vec<String>> {
        let path = self.root.join(JOURNAL_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn resolve(&self, path: &str) -> WorkloadResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(WorkloadError::InvalidPath(path.to_string())),
            }
        }
        if resolved == self.root {
            return Err(WorkloadError::InvalidPath(path.to_string()));
        }
        Ok(resolved)
    }

    fn ensure_connected(&self) -> WorkloadResult<()> {
        if self.can_connect() {
            Ok(())
        } else {
            Err(WorkloadError::NotConnected)
        }
    }

    fn record(&self, line: &str) -> WorkloadResult<()> {
        let path = self.root.join(JOURNAL_FILE);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        writeln!(file, "{line}").map_err(|e| io_err(&path, e))
    }
}

impl Workload for LocalWorkload {
    fn can_connect(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.root.is_dir()
    }

    fn push(&self, path: &str, content: &str) -> WorkloadResult<()> {
        self.ensure_connected()?;
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(&target, content).map_err(|e| io_err(&target, e))?;
        debug!(path, bytes = content.len(), "pushed file");
        Ok(())
    }

    fn pull(&self, path: &str) -> WorkloadResult<Option<String>> {
        self.ensure_connected()?;
        let target = self.resolve(path)?;
        match fs::read_to_string(&target) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&target, e)),
        }
    }

    fn exists(&self, path: &str) -> WorkloadResult<bool> {
        self.ensure_connected()?;
        Ok(self.resolve(path)?.exists())
    }

    fn remove_path(&self, path: &str, recursive: bool) -> WorkloadResult<bool> {
        self.ensure_connected()?;
        let target = self.resolve(path)?;
        if !target.exists() {
            return Ok(false);
        }
        let result = if target.is_dir() {
            if recursive {
                fs::remove_dir_all(&target)
            } else {
                fs::remove_dir(&target)
            }
        } else {
            fs::remove_file(&target)
        };
        result.map_err(|e| io_err(&target, e))?;
        debug!(path, recursive, "removed path");
        Ok(true)
    }

    fn list_dir(&self, path: &str) -> WorkloadResult<Vec<String>> {
        self.ensure_connected()?;
        let target = self.resolve(path)?;
        let entries = match fs::read_dir(&target) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&target, e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&target, e))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exec(&self, command: &[&str]) -> WorkloadResult<()> {
        self.ensure_connected()?;
        self.record(&format!("exec {}", command.join(" ")))
    }

    fn plan(&self) -> WorkloadResult<Option<ServicePlan>> {
        self.ensure_connected()?;
        let path = self.root.join(PLAN_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        let plan = serde_json::from_str(&text).map_err(|e| WorkloadError::Plan(e.to_string()))?;
        Ok(Some(plan))
    }

    fn replan(&self, plan: &ServicePlan) -> WorkloadResult<()> {
        self.ensure_connected()?;
        let path = self.root.join(PLAN_FILE);
        let text =
            serde_json::to_string_pretty(plan).map_err(|e| WorkloadError::Plan(e.to_string()))?;
        fs::write(&path, text).map_err(|e| io_err(&path, e))?;
        self.record("replan")
    }

    fn restart(&self) -> WorkloadResult<()> {
        self.ensure_connected()?;
        self.record("restart")
    }
}
