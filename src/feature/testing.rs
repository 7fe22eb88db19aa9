//! Scripted features for dispatch tests.

use super::{Feature, FeatureKind};
use crate::config::Settings;
use crate::connection::{ActionKind, ActionSink};
use crate::error::FeatureError;
use crate::notification::FileEvent;
use crate::rules::RuleSet;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

pub(crate) fn rules() -> RuleSet {
    RuleSet::from_settings(&Settings::default())
}

/// Shared counters a test keeps after the feature is boxed.
#[derive(Clone, Default)]
pub(crate) struct Tally {
    watch_calls: Rc<Cell<usize>>,
    file_events: Rc<Cell<usize>>,
}

impl Tally {
    pub(crate) fn watch_calls(&self) -> usize {
        self.watch_calls.get()
    }

    pub(crate) fn file_events(&self) -> usize {
        self.file_events.get()
    }
}

enum WatchBehavior {
    Normal,
    Fail,
    Panic,
}

pub(crate) struct ScriptedFeature {
    kind: FeatureKind,
    init_ok: bool,
    behavior: WatchBehavior,
    /// Return values for successive `watch()` calls; `false` once exhausted.
    away: VecDeque<bool>,
    tally: Tally,
}

impl ScriptedFeature {
    pub(crate) fn new(kind: FeatureKind) -> (Self, Tally) {
        let tally = Tally::default();
        let feature = Self {
            kind,
            init_ok: true,
            behavior: WatchBehavior::Normal,
            away: VecDeque::new(),
            tally: tally.clone(),
        };
        (feature, tally)
    }

    pub(crate) fn failing_init(mut self) -> Self {
        self.init_ok = false;
        self
    }

    pub(crate) fn failing_watch(mut self) -> Self {
        self.behavior = WatchBehavior::Fail;
        self
    }

    pub(crate) fn panicking_watch(mut self) -> Self {
        self.behavior = WatchBehavior::Panic;
        self
    }

    pub(crate) fn with_away(mut self, script: Vec<bool>) -> Self {
        self.away = script.into();
        self
    }
}

impl Feature for ScriptedFeature {
    fn kind(&self) -> FeatureKind {
        self.kind
    }

    fn initialize(&mut self, _rules: &RuleSet) -> Result<(), FeatureError> {
        if self.init_ok {
            Ok(())
        } else {
            Err(FeatureError::Unavailable("scripted".to_string()))
        }
    }

    fn watch(&mut self, sink: &mut ActionSink) -> Result<bool, FeatureError> {
        self.tally.watch_calls.set(self.tally.watch_calls.get() + 1);
        match self.behavior {
            WatchBehavior::Normal => {}
            WatchBehavior::Fail => {
                return Err(FeatureError::Unavailable("scripted failure".to_string()))
            }
            WatchBehavior::Panic => panic!("scripted panic"),
        }
        if self.kind == FeatureKind::Process {
            sink.report(ActionKind::Process, "scripted.exe started");
        }
        Ok(self.away.pop_front().unwrap_or(false))
    }

    fn on_file_event(
        &mut self,
        event: &FileEvent,
        sink: &mut ActionSink,
    ) -> Result<(), FeatureError> {
        self.tally.file_events.set(self.tally.file_events.get() + 1);
        sink.report(ActionKind::FileIo, event.path.display().to_string());
        Ok(())
    }
}
