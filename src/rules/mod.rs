//! Rule set: per-feature rules and loop intervals.
//!
//! Built once from [`Settings`] and read-only afterwards. The rule set also
//! owns the directory watcher for the file-I/O paths, because the watch
//! handles belong to the rules rather than to any one feature.

pub mod pattern;
pub mod types;

pub use pattern::*;
pub use types::*;

use crate::config::Settings;
use crate::notification::{FileEvent, NotificationSender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::time::Duration;

/// All rules for one agent process.
pub struct RuleSet {
    away: AwayRule,
    process: ProcessRule,
    print: PrintRule,
    file_io: FileIoRule,
    watch_interval: Duration,
    reconnect_interval: Duration,
    watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("away", &self.away)
            .field("process", &self.process)
            .field("print", &self.print)
            .field("file_io", &self.file_io)
            .field("watch_interval", &self.watch_interval)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

impl RuleSet {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            away: AwayRule::from(&settings.away),
            process: ProcessRule::from(&settings.process),
            print: PrintRule::from(&settings.print),
            file_io: FileIoRule::from(&settings.file_io),
            watch_interval: Duration::from_millis(settings.watch.interval),
            reconnect_interval: Duration::from_millis(settings.server.retry_interval),
            watcher: None,
        }
    }

    /// Opens directory watches for the file-I/O paths and routes their events
    /// into the notification channel.
    ///
    /// Never fails: an unwatchable path is logged and skipped.
    pub fn initialize(&mut self, notifier: &NotificationSender) {
        if self.file_io.paths.is_empty() || self.watcher.is_some() {
            return;
        }

        let tx = notifier.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(&event) {
                        tx.file_io(file_event);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Directory watch error"),
            }
        });

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create directory watcher");
                return;
            }
        };

        let mode = if self.file_io.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let mut watched = 0usize;
        for path in &self.file_io.paths {
            match watcher.watch(path, mode) {
                Ok(()) => {
                    watched += 1;
                    tracing::debug!(path = ?path, "Watching path");
                }
                Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to watch path"),
            }
        }

        if watched > 0 {
            tracing::info!(paths = watched, "Directory watcher started");
            self.watcher = Some(watcher);
        }
    }

    /// Drops the directory watcher. Safe to call more than once.
    pub fn release(&mut self) {
        if self.watcher.take().is_some() {
            tracing::info!("Directory watcher released");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn away_rule(&self) -> &AwayRule {
        &self.away
    }

    pub fn process_rule(&self) -> &ProcessRule {
        &self.process
    }

    pub fn print_rule(&self) -> &PrintRule {
        &self.print
    }

    pub fn file_io_rule(&self) -> &FileIoRule {
        &self.file_io
    }

    /// Watch tick interval. May be zero, which the scheduler rejects.
    pub fn watch_interval(&self) -> Duration {
        self.watch_interval
    }

    /// Reconnect interval; `None` when zero, meaning "do not reconnect".
    pub fn reconnect_interval(&self) -> Option<Duration> {
        (!self.reconnect_interval.is_zero()).then_some(self.reconnect_interval)
    }
}
