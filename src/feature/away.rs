//! Away (idle) detection.
//!
//! The user counts as away once the time since the last keyboard or mouse
//! input reaches the rule threshold. Transitions are reported; the current
//! state is returned on every tick so the scheduler can suppress the other
//! features.

use super::{Feature, FeatureKind};
use crate::connection::{ActionKind, ActionSink};
use crate::error::FeatureError;
use crate::rules::RuleSet;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of "time since last user input".
pub trait IdleSource {
    /// `None` when the platform cannot report idle time.
    fn idle_time(&self) -> Option<Duration>;
}

/// Idle time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdle;

impl IdleSource for SystemIdle {
    #[cfg(windows)]
    fn idle_time(&self) -> Option<Duration> {
        crate::winapi_utils::get_idle_time()
    }

    #[cfg(not(windows))]
    fn idle_time(&self) -> Option<Duration> {
        None
    }
}

pub struct AwayDetector<S> {
    source: S,
    threshold: Duration,
    away_since: Option<DateTime<Utc>>,
}

impl<S: IdleSource> AwayDetector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            threshold: Duration::ZERO,
            away_since: None,
        }
    }

    pub fn is_away(&self) -> bool {
        self.away_since.is_some()
    }
}

impl<S: IdleSource> Feature for AwayDetector<S> {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Away
    }

    fn initialize(&mut self, rules: &RuleSet) -> Result<(), FeatureError> {
        let threshold = rules.away_rule().threshold;
        if threshold.is_zero() {
            return Err(FeatureError::InvalidRule(
                "away threshold must be non-zero".to_string(),
            ));
        }
        if self.source.idle_time().is_none() {
            return Err(FeatureError::Unavailable("user idle time".to_string()));
        }
        self.threshold = threshold;
        tracing::debug!(threshold_secs = threshold.as_secs(), "Away detector ready");
        Ok(())
    }

    fn watch(&mut self, sink: &mut ActionSink) -> Result<bool, FeatureError> {
        let idle = self
            .source
            .idle_time()
            .ok_or_else(|| FeatureError::Unavailable("user idle time".to_string()))?;
        let now_away = idle >= self.threshold;

        match (self.away_since, now_away) {
            (None, true) => {
                let since = Utc::now()
                    - chrono::Duration::from_std(idle).unwrap_or_else(|_| chrono::Duration::zero());
                sink.report(
                    ActionKind::Away,
                    format!("user is away (idle {})", format_duration(idle)),
                );
                self.away_since = Some(since);
            }
            (Some(since), false) => {
                let away_for = (Utc::now() - since).to_std().unwrap_or_default();
                sink.report(
                    ActionKind::Back,
                    format!("user is back after {}", format_duration(away_for)),
                );
                self.away_since = None;
            }
            _ => {}
        }

        Ok(now_away)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
