//! File I/O monitoring.
//!
//! Events arrive through the notification channel rather than by polling.
//! Repeated events for the same path and kind are coalesced until the next
//! watch tick, which clears the coalescing set.

use super::{Feature, FeatureKind};
use crate::connection::{ActionKind, ActionSink};
use crate::error::FeatureError;
use crate::notification::{FileEvent, FileEventKind};
use crate::rules::{FileIoRule, RuleSet};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Default)]
pub struct FileIoMonitor {
    rule: Option<FileIoRule>,
    seen: HashSet<(PathBuf, FileEventKind)>,
}

impl FileIoMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Feature for FileIoMonitor {
    fn kind(&self) -> FeatureKind {
        FeatureKind::FileIo
    }

    fn initialize(&mut self, rules: &RuleSet) -> Result<(), FeatureError> {
        let rule = rules.file_io_rule();
        if rule.paths.is_empty() {
            return Err(FeatureError::Disabled("file I/O monitor"));
        }
        if !(rule.create || rule.modify || rule.remove) {
            return Err(FeatureError::InvalidRule(
                "no file event kinds enabled".to_string(),
            ));
        }
        self.rule = Some(rule.clone());
        Ok(())
    }

    fn watch(&mut self, _sink: &mut ActionSink) -> Result<bool, FeatureError> {
        self.seen.clear();
        Ok(false)
    }

    fn on_file_event(&mut self, event: &FileEvent, sink: &mut ActionSink) -> Result<(), FeatureError> {
        let Some(rule) = &self.rule else {
            return Ok(());
        };
        if !rule.accepts(event) {
            return Ok(());
        }
        if self.seen.insert((event.path.clone(), event.kind)) {
            sink.report(
                ActionKind::FileIo,
                format!("{} {}", event.path.display(), event.kind),
            );
        }
        Ok(())
    }
}
