//! The watch scheduler.
//!
//! Owns the collector link, the rule set, the active features and the action
//! queue, and drives them from one loop. Each pass of the loop:
//!
//! 1. handles the host notifications already queued (file event, session
//!    ending, shutdown), up to a fixed batch
//! 2. runs one watch cycle over the features if the watch tick is due
//! 3. re-initializes the link if the reconnect tick is due and it is offline
//!
//! and only waits when none of the three has work. Actions reported during a
//! pass are delivered before the next one. Whatever the link does not take
//! goes to the outbox, which is replayed oldest first once the link drains.
//! Replay is at-least-once: an action whose line was cut short by
//! backpressure stays spooled and may reach the collector twice.

use crate::connection::{ActionKind, ActionSink, Connection, Identity, Link, Outbox, UserAction};
use crate::error::{AgentError, LinkError, OutboxError};
use crate::feature::{Feature, FeatureSet};
use crate::notification::{Notification, NotificationReceiver, NotificationSender};
use crate::rules::RuleSet;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Outbox rows fetched per replay batch.
const REPLAY_BATCH: usize = 100;

/// Notifications handled per pass before the timers get their turn.
const NOTIFICATION_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub watch_cycles: u64,
    /// Cycles in which the away detector suppressed the other features.
    pub suppressed_cycles: u64,
    pub reconnect_attempts: u64,
    pub delivered: u64,
    pub spooled: u64,
    pub replayed: u64,
    /// Actions lost because they could not be sent and no outbox took them.
    pub dropped: u64,
}

pub struct WatchScheduler<L: Link = Connection> {
    link: L,
    rules: RuleSet,
    features: FeatureSet,
    sink: ActionSink,
    outbox: Option<Outbox>,
    /// The outbox holds actions that must go out before any new one.
    backlog: bool,
    state: SchedulerState,
    stats: RunSummary,
}

impl<L: Link> WatchScheduler<L> {
    /// Binds the link, opens the rule set's watches and starts whichever
    /// candidate features initialize successfully.
    ///
    /// The link gets exactly one connect attempt here. Failing it is not
    /// fatal; the reconnect timer (if enabled) keeps trying.
    pub async fn initialize(
        mut link: L,
        mut rules: RuleSet,
        candidates: Vec<Box<dyn Feature>>,
        notifier: &NotificationSender,
        identity: Identity,
        outbox: Option<Outbox>,
    ) -> Self {
        if !link.initialize().await {
            tracing::warn!("Collector unreachable at startup, continuing offline");
        }

        rules.initialize(notifier);
        let features = FeatureSet::initialize(candidates, &rules);
        if features.is_empty() {
            tracing::warn!("No features started");
        }

        let backlog = outbox
            .as_ref()
            .is_some_and(|outbox| matches!(outbox.is_empty(), Ok(false)));

        Self {
            link,
            rules,
            features,
            sink: ActionSink::new(identity),
            outbox,
            backlog,
            state: SchedulerState::Initializing,
            stats: RunSummary::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn outbox(&self) -> Option<&Outbox> {
        self.outbox.as_ref()
    }

    /// Runs until a shutdown notification arrives or every sender is gone.
    ///
    /// A scheduler runs once; calling this again after it returned gives
    /// [`AgentError::Stopped`].
    pub async fn run(
        &mut self,
        mut notifications: NotificationReceiver,
    ) -> Result<RunSummary, AgentError> {
        if self.state != SchedulerState::Initializing {
            return Err(AgentError::Stopped);
        }

        let watch_period = self.rules.watch_interval();
        if watch_period.is_zero() {
            self.drain();
            return Err(AgentError::Timer("watch"));
        }
        let mut watch_timer = time::interval(watch_period);
        watch_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first reconnect tick is one period out: initialize() has just
        // made the startup attempt.
        let mut retry_timer = self.rules.reconnect_interval().map(|period| {
            let mut timer = time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        if retry_timer.is_none() {
            tracing::info!("Reconnect disabled");
        }

        self.state = SchedulerState::Running;
        tracing::info!(
            features = ?self.features.kinds(),
            watch_ms = watch_period.as_millis() as u64,
            online = self.link.is_online(),
            "Watch scheduler running"
        );

        let identity = self.sink.identity().clone();
        self.sink.report(
            ActionKind::Logon,
            format!("{} ({})", identity.user, identity.computer),
        );
        self.deliver();

        'run: loop {
            for _ in 0..NOTIFICATION_BATCH {
                match notifications.try_recv() {
                    Ok(notification) => {
                        if !self.handle_notification(notification) {
                            break 'run;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::info!("Notification channel closed");
                        break 'run;
                    }
                }
            }

            // Timers come before waiting on the channel, so a steady stream
            // of notifications cannot hold back the watch cycle.
            tokio::select! {
                biased;

                _ = watch_timer.tick() => self.watch_tick(),
                _ = next_tick(&mut retry_timer) => self.retry_connect().await,
                notification = notifications.recv() => match notification {
                    Some(notification) => {
                        if !self.handle_notification(notification) {
                            break 'run;
                        }
                    }
                    None => {
                        tracing::info!("Notification channel closed");
                        break 'run;
                    }
                },
            }
            self.deliver();
        }

        self.deliver();
        drop(watch_timer);
        drop(retry_timer);
        self.drain();

        tracing::info!(
            watch_cycles = self.stats.watch_cycles,
            suppressed_cycles = self.stats.suppressed_cycles,
            reconnect_attempts = self.stats.reconnect_attempts,
            delivered = self.stats.delivered,
            spooled = self.stats.spooled,
            replayed = self.stats.replayed,
            dropped = self.stats.dropped,
            "Watch scheduler stopped"
        );
        Ok(self.stats)
    }

    /// Handles one notification. Returns `false` on shutdown.
    fn handle_notification(&mut self, notification: Notification) -> bool {
        match notification {
            Notification::FileIo(event) => {
                if !self.features.forward_file_event(&event, &mut self.sink) {
                    tracing::debug!(path = ?event.path, "File event ignored, no file I/O monitor");
                }
            }
            Notification::SessionEnding => {
                let identity = self.sink.identity().clone();
                tracing::info!(user = %identity.user, "User session ending");
                self.sink.report(
                    ActionKind::Logoff,
                    format!("{} ({})", identity.user, identity.computer),
                );
            }
            Notification::Shutdown => {
                tracing::info!("Shutdown requested");
                return false;
            }
        }
        true
    }

    fn watch_tick(&mut self) {
        let outcome = self.features.watch_cycle(&mut self.sink);
        self.stats.watch_cycles += 1;
        if outcome.away_active {
            self.stats.suppressed_cycles += 1;
        }
    }

    async fn retry_connect(&mut self) {
        if self.link.is_online() {
            return;
        }

        self.stats.reconnect_attempts += 1;
        if self.link.initialize().await {
            tracing::info!("Collector is online again");
            self.replay_outbox();
        } else {
            tracing::debug!(
                attempts = self.stats.reconnect_attempts,
                "Collector still offline"
            );
        }
    }

    /// Sends every queued action, spooling what the link does not take.
    ///
    /// While the outbox has a backlog, new actions queue behind it so the
    /// collector sees them in order.
    fn deliver(&mut self) {
        if self.link.is_online() {
            match self.link.flush() {
                Ok(()) if self.backlog => self.replay_outbox(),
                Ok(()) => {}
                Err(e) => tracing::debug!(error = %e, "Link not drained"),
            }
        }

        let actions: Vec<UserAction> = self.sink.drain().collect();
        for action in actions {
            if self.backlog || !self.link.is_online() {
                self.spool(&action);
                continue;
            }
            match self.link.send(&action) {
                Ok(()) => self.stats.delivered += 1,
                Err(e @ LinkError::Backpressure { .. }) => {
                    tracing::debug!(kind = %action.kind, error = %e, "Send deferred");
                    self.spool(&action);
                }
                Err(e) => {
                    tracing::warn!(kind = %action.kind, error = %e, "Send failed");
                    self.spool(&action);
                }
            }
        }
    }

    fn spool(&mut self, action: &UserAction) {
        let Some(outbox) = self.outbox.as_ref() else {
            self.stats.dropped += 1;
            tracing::debug!(kind = %action.kind, "No outbox, action dropped");
            return;
        };

        match outbox.push(action) {
            Ok(_) => {
                self.stats.spooled += 1;
                self.backlog = true;
            }
            Err(e) => {
                self.stats.dropped += 1;
                tracing::warn!(kind = %action.kind, error = %e, "Failed to spool action");
            }
        }
    }

    fn replay_outbox(&mut self) {
        match self.try_replay() {
            Ok(0) => {}
            Ok(replayed) => {
                self.stats.replayed += replayed as u64;
                tracing::info!(replayed, "Replayed spooled actions");
            }
            Err(e) => tracing::warn!(error = %e, "Outbox replay failed"),
        }
    }

    /// Sends spooled actions oldest first. A row is removed only after the
    /// link has written all of it. Stops at the first send the link does not
    /// take, leaving the rest in the outbox.
    fn try_replay(&mut self) -> Result<usize, OutboxError> {
        let Some(outbox) = self.outbox.as_ref() else {
            self.backlog = false;
            return Ok(0);
        };

        let mut replayed = 0;
        loop {
            let batch = outbox.peek(REPLAY_BATCH)?;
            if batch.is_empty() {
                self.backlog = false;
                return Ok(replayed);
            }
            for (id, action) in batch {
                if let Err(e) = self.link.send(&action) {
                    tracing::debug!(error = %e, "Replay interrupted");
                    return Ok(replayed);
                }
                outbox.remove(id)?;
                replayed += 1;
            }
        }
    }

    fn drain(&mut self) {
        self.state = SchedulerState::Draining;
        self.features.clear();
        self.rules.release();

        if self.link.is_online() {
            if let Err(e) = self.link.flush() {
                tracing::warn!(error = %e, "Unwritten bytes at shutdown");
            }
        }

        let remaining: Vec<UserAction> = self.sink.drain().collect();
        for action in &remaining {
            self.spool(action);
        }

        self.state = SchedulerState::Stopped;
    }
}

/// Waits for the next reconnect tick, or forever when reconnect is disabled.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
