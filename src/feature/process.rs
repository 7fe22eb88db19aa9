//! Process launch monitoring.
//!
//! Each tick takes a process snapshot and reports processes that were not
//! present in the previous one. The baseline is taken at initialize, so
//! processes already running when the agent starts are never reported.

use super::{Feature, FeatureKind};
use crate::connection::{ActionKind, ActionSink};
use crate::error::FeatureError;
use crate::rules::{ProcessRule, RuleSet};
use std::collections::HashMap;

/// One running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

/// Source of process snapshots.
pub trait ProcessSource {
    fn snapshot(&mut self) -> Result<Vec<ProcessEntry>, FeatureError>;
}

/// Process list from `sysinfo`.
pub struct SysinfoProcesses {
    system: sysinfo::System,
}

impl SysinfoProcesses {
    pub fn new() -> Self {
        Self {
            system: sysinfo::System::new(),
        }
    }
}

impl Default for SysinfoProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoProcesses {
    fn snapshot(&mut self) -> Result<Vec<ProcessEntry>, FeatureError> {
        self.system.refresh_processes();
        Ok(self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string(),
            })
            .collect())
    }
}

pub struct ProcessMonitor<S> {
    source: S,
    rule: ProcessRule,
    /// pid -> name from the previous snapshot.
    known: HashMap<u32, String>,
}

impl<S: ProcessSource> ProcessMonitor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            rule: ProcessRule::default(),
            known: HashMap::new(),
        }
    }

    fn take_snapshot(&mut self) -> Result<HashMap<u32, String>, FeatureError> {
        Ok(self
            .source
            .snapshot()?
            .into_iter()
            .map(|p| (p.pid, p.name))
            .collect())
    }
}

impl<S: ProcessSource> Feature for ProcessMonitor<S> {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Process
    }

    fn initialize(&mut self, rules: &RuleSet) -> Result<(), FeatureError> {
        self.rule = rules.process_rule().clone();
        self.known = self.take_snapshot()?;
        if self.known.is_empty() {
            return Err(FeatureError::Unavailable("process list".to_string()));
        }
        tracing::debug!(baseline = self.known.len(), "Process monitor ready");
        Ok(())
    }

    fn watch(&mut self, sink: &mut ActionSink) -> Result<bool, FeatureError> {
        let current = self.take_snapshot()?;

        let mut launched: Vec<(&u32, &String)> = current
            .iter()
            .filter(|(pid, name)| {
                // A reused pid with a different name is a new launch.
                self.known.get(*pid) != Some(*name)
            })
            .collect();
        launched.sort_by_key(|(pid, _)| **pid);

        for (pid, name) in launched {
            if self.rule.should_report(name) {
                sink.report(ActionKind::Process, format!("{} started (pid {})", name, pid));
            } else {
                tracing::trace!(process = %name, pid, "Launch not reported by rule");
            }
        }

        self.known = current;
        Ok(false)
    }
}
