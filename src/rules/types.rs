//! Per-feature rule records.

use super::pattern::any_matches;
use crate::config::{AwaySettings, FileIoSettings, PrintSettings, ProcessSettings};
use crate::notification::{FileEvent, FileEventKind};
use std::path::PathBuf;
use std::time::Duration;

/// Away detection threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct AwayRule {
    pub threshold: Duration,
}

impl From<&AwaySettings> for AwayRule {
    fn from(s: &AwaySettings) -> Self {
        Self {
            threshold: Duration::from_secs(s.threshold),
        }
    }
}

/// Which process launches get reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessRule {
    pub watch: Vec<String>,
    pub ignore: Vec<String>,
}

impl ProcessRule {
    /// Ignore patterns win over watch patterns; an empty watch list means all.
    pub fn should_report(&self, process_name: &str) -> bool {
        if any_matches(&self.ignore, process_name) {
            return false;
        }
        self.watch.is_empty() || any_matches(&self.watch, process_name)
    }
}

impl From<&ProcessSettings> for ProcessRule {
    fn from(s: &ProcessSettings) -> Self {
        Self {
            watch: s.watch.clone(),
            ignore: s.ignore.clone(),
        }
    }
}

/// Print spool policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintRule {
    pub enabled: bool,
    pub spool_dir: PathBuf,
}

impl PrintRule {
    /// Platform spool directory used when none is configured.
    pub fn default_spool_dir() -> PathBuf {
        if cfg!(windows) {
            let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
            PathBuf::from(root)
                .join("System32")
                .join("spool")
                .join("PRINTERS")
        } else {
            PathBuf::from("/var/spool/cups")
        }
    }
}

impl From<&PrintSettings> for PrintRule {
    fn from(s: &PrintSettings) -> Self {
        Self {
            enabled: s.enabled,
            spool_dir: s.spool_dir.clone().unwrap_or_else(Self::default_spool_dir),
        }
    }
}

/// Paths under directory watch and which events to report.
#[derive(Debug, Clone, PartialEq)]
pub struct FileIoRule {
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    /// Lowercase, without the leading dot.
    pub extensions: Vec<String>,
    pub create: bool,
    pub modify: bool,
    pub remove: bool,
}

impl FileIoRule {
    pub fn accepts(&self, event: &FileEvent) -> bool {
        let kind_enabled = match event.kind {
            FileEventKind::Create => self.create,
            FileEventKind::Modify => self.modify,
            FileEventKind::Remove => self.remove,
        };
        if !kind_enabled {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        event
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == &ext.to_lowercase()))
            .unwrap_or(false)
    }
}

impl From<&FileIoSettings> for FileIoRule {
    fn from(s: &FileIoSettings) -> Self {
        Self {
            paths: s.paths.clone(),
            recursive: s.recursive,
            extensions: s
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            create: s.create,
            modify: s.modify,
            remove: s.remove,
        }
    }
}
