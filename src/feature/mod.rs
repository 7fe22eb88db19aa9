//! Feature watchers and the ordered set the scheduler dispatches to.
//!
//! A feature inspects one aspect of the workstation on each watch tick and
//! reports observations into an [`ActionSink`]. The away detector has its own
//! slot in [`FeatureSet`]: it is always dispatched first, and its result
//! decides whether the other features run on that tick.

pub mod away;
pub mod file_io;
pub mod print;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

pub use away::*;
pub use file_io::*;
pub use print::*;
pub use process::*;

use crate::connection::ActionSink;
use crate::error::FeatureError;
use crate::notification::FileEvent;
use crate::rules::RuleSet;
use std::panic::{self, AssertUnwindSafe};

/// Feature variants, in declared initialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    Away,
    Process,
    Print,
    FileIo,
}

impl FeatureKind {
    pub const DECLARED_ORDER: [FeatureKind; 4] = [
        FeatureKind::Away,
        FeatureKind::Process,
        FeatureKind::Print,
        FeatureKind::FileIo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::Away => "away",
            FeatureKind::Process => "process",
            FeatureKind::Print => "print",
            FeatureKind::FileIo => "file_io",
        }
    }
}

/// A watcher capability.
pub trait Feature {
    fn kind(&self) -> FeatureKind;

    /// Binds rule data. On `Err` the feature is discarded.
    fn initialize(&mut self, rules: &RuleSet) -> Result<(), FeatureError>;

    /// Inspects current state once. Returns `true` only for the away detector
    /// while the user is away; every other feature returns `false`.
    fn watch(&mut self, sink: &mut ActionSink) -> Result<bool, FeatureError>;

    /// Handles a file event forwarded from the notification channel.
    fn on_file_event(
        &mut self,
        _event: &FileEvent,
        _sink: &mut ActionSink,
    ) -> Result<(), FeatureError> {
        Ok(())
    }
}

/// Result of one watch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub away_active: bool,
    /// Number of `watch()` calls made this cycle.
    pub watched: usize,
    /// Number of features skipped because the user is away.
    pub suppressed: usize,
}

/// Active features in dispatch order.
#[derive(Default)]
pub struct FeatureSet {
    /// The away detector. Dispatched first on every tick.
    away: Option<Box<dyn Feature>>,
    /// Everything else, in declared order. Suppressed while away.
    monitors: Vec<Box<dyn Feature>>,
}

impl FeatureSet {
    /// Initializes each candidate in declared order and keeps those that
    /// succeed. Any subset, including none, is a valid result.
    pub fn initialize(mut candidates: Vec<Box<dyn Feature>>, rules: &RuleSet) -> Self {
        candidates.sort_by_key(|f| f.kind());

        let mut set = Self::default();
        for mut feature in candidates {
            let kind = feature.kind();
            if let Err(e) = feature.initialize(rules) {
                tracing::warn!(feature = kind.name(), error = %e, "Feature not started");
                continue;
            }

            if kind == FeatureKind::Away {
                if set.away.is_some() {
                    tracing::warn!("Duplicate away detector ignored");
                    continue;
                }
                set.away = Some(feature);
            } else {
                set.monitors.push(feature);
            }
            tracing::info!(feature = kind.name(), "Feature started");
        }
        set
    }

    pub fn len(&self) -> usize {
        self.monitors.len() + usize::from(self.away.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active kinds in dispatch order.
    pub fn kinds(&self) -> Vec<FeatureKind> {
        self.away
            .iter()
            .chain(self.monitors.iter())
            .map(|f| f.kind())
            .collect()
    }

    /// Runs one watch cycle: the away detector first, then every other
    /// feature only if the user is not away.
    pub fn watch_cycle(&mut self, sink: &mut ActionSink) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        if let Some(away) = self.away.as_deref_mut() {
            outcome.away_active = contained_watch(away, sink);
            outcome.watched += 1;
        }

        if outcome.away_active {
            outcome.suppressed = self.monitors.len();
            return outcome;
        }

        for feature in &mut self.monitors {
            contained_watch(feature.as_mut(), sink);
            outcome.watched += 1;
        }
        outcome
    }

    /// Forwards a file event to the FileIo feature. Returns `false` when no
    /// FileIo feature is active.
    pub fn forward_file_event(&mut self, event: &FileEvent, sink: &mut ActionSink) -> bool {
        let Some(feature) = self
            .monitors
            .iter_mut()
            .find(|f| f.kind() == FeatureKind::FileIo)
        else {
            return false;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| feature.on_file_event(event, sink)));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(path = ?event.path, error = %e, "File event handling failed")
            }
            Err(_) => tracing::error!(path = ?event.path, "File event handler panicked"),
        }
        true
    }

    /// Drops every feature.
    pub fn clear(&mut self) {
        let count = self.len();
        self.away = None;
        self.monitors.clear();
        tracing::debug!(count, "Features released");
    }
}

/// Calls `watch()` and contains any error or panic. A failed call counts as
/// "not away".
fn contained_watch(feature: &mut dyn Feature, sink: &mut ActionSink) -> bool {
    let kind = feature.kind();
    match panic::catch_unwind(AssertUnwindSafe(|| feature.watch(sink))) {
        Ok(Ok(away)) => away,
        Ok(Err(e)) => {
            tracing::warn!(feature = kind.name(), error = %e, "Watch failed");
            false
        }
        Err(_) => {
            tracing::error!(feature = kind.name(), "Watch panicked");
            false
        }
    }
}

/// The production feature candidates, in declared order.
pub fn default_features() -> Vec<Box<dyn Feature>> {
    vec![
        Box::new(AwayDetector::new(SystemIdle)),
        Box::new(ProcessMonitor::new(SysinfoProcesses::new())),
        Box::new(PrintMonitor::new(SpoolDirectory::default())),
        Box::new(FileIoMonitor::new()),
    ]
}
