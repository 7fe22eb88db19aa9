//! Print job monitoring through the spool directory.
//!
//! The spooler writes one data file per queued job (`*.SPL` on Windows,
//! `dNNNNN-NNN` under CUPS). A data file that was not there on the previous
//! tick is reported as a new print job.

use super::{Feature, FeatureKind};
use crate::connection::{ActionKind, ActionSink};
use crate::error::FeatureError;
use crate::rules::{PrintRule, RuleSet};
use std::collections::HashSet;
use std::path::PathBuf;

/// One spooled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolEntry {
    pub name: String,
    pub size: u64,
}

/// Source of currently spooled jobs.
pub trait SpoolSource {
    /// Binds the source to the rule's spool location.
    fn bind(&mut self, _rule: &PrintRule) -> Result<(), FeatureError> {
        Ok(())
    }

    fn jobs(&mut self) -> Result<Vec<SpoolEntry>, FeatureError>;
}

/// Reads job data files from a spool directory.
#[derive(Debug, Default)]
pub struct SpoolDirectory {
    dir: PathBuf,
}

impl SpoolDirectory {
    fn is_job_file(name: &str) -> bool {
        let spl = std::path::Path::new(name)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("spl"))
            .unwrap_or(false);
        let cups_data = name.starts_with('d')
            && name[1..].starts_with(|c: char| c.is_ascii_digit());
        spl || cups_data
    }
}

impl SpoolSource for SpoolDirectory {
    fn bind(&mut self, rule: &PrintRule) -> Result<(), FeatureError> {
        if !rule.spool_dir.is_dir() {
            return Err(FeatureError::Unavailable(format!(
                "spool directory {}",
                rule.spool_dir.display()
            )));
        }
        self.dir = rule.spool_dir.clone();
        Ok(())
    }

    fn jobs(&mut self) -> Result<Vec<SpoolEntry>, FeatureError> {
        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !Self::is_job_file(&name) {
                continue;
            }
            // Jobs can finish between read_dir and metadata.
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_file() {
                jobs.push(SpoolEntry {
                    name,
                    size: meta.len(),
                });
            }
        }
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }
}

pub struct PrintMonitor<S> {
    source: S,
    known: HashSet<String>,
}

impl<S: SpoolSource> PrintMonitor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            known: HashSet::new(),
        }
    }
}

impl<S: SpoolSource> Feature for PrintMonitor<S> {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Print
    }

    fn initialize(&mut self, rules: &RuleSet) -> Result<(), FeatureError> {
        let rule = rules.print_rule();
        if !rule.enabled {
            return Err(FeatureError::Disabled("print monitor"));
        }
        self.source.bind(rule)?;
        self.known = self.source.jobs()?.into_iter().map(|j| j.name).collect();
        tracing::debug!(
            spool_dir = ?rule.spool_dir,
            queued = self.known.len(),
            "Print monitor ready"
        );
        Ok(())
    }

    fn watch(&mut self, sink: &mut ActionSink) -> Result<bool, FeatureError> {
        let jobs = self.source.jobs()?;

        for job in &jobs {
            if !self.known.contains(&job.name) {
                sink.report(
                    ActionKind::Print,
                    format!("print job {} queued ({} bytes)", job.name, job.size),
                );
            }
        }

        self.known = jobs.into_iter().map(|j| j.name).collect();
        Ok(false)
    }
}
