// Per-context analysis loop: interval passes, debounced scroll passes, teardown
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::analysis::{AnalysisReport, AnalyzerState, Trigger};
use crate::monitor::action::{wants_auto_action, ActionCooldown, PageActor};
use crate::monitor::source::TextSource;
use crate::monitor::{ContextId, MonitorEvent, MonitorTiming, ReportEnvelope};
use crate::settings::SettingsCell;

/// Handle to a running context loop
pub struct ContextHandle {
    id: ContextId,
    cancel: CancellationToken,
    scroll_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl ContextHandle {
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Signal a scroll-like event; bursts collapse into one pass after the quiet period
    pub fn notify_scroll(&self) {
        // A full buffer already holds a pending notification
        let _ = self.scroll_tx.try_send(());
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the loop and any delayed actions, then wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(context = %self.id, "Context loop ended abnormally: {}", e);
        }
    }
}

/// Everything one context loop needs
pub(crate) struct ContextWorker {
    pub id: ContextId,
    pub source: Arc<dyn TextSource>,
    pub actor: Arc<dyn PageActor>,
    pub settings: SettingsCell,
    pub events: broadcast::Sender<MonitorEvent>,
    pub timing: MonitorTiming,
}

impl ContextWorker {
    /// Spawn the loop on the current runtime
    pub fn spawn(self, cancel: CancellationToken) -> ContextHandle {
        let (scroll_tx, scroll_rx) = mpsc::channel(1);
        let id = self.id.clone();
        let join = tokio::spawn(self.run(scroll_rx, cancel.clone()));

        ContextHandle {
            id,
            cancel,
            scroll_tx,
            join,
        }
    }

    async fn run(self, mut scroll_rx: mpsc::Receiver<()>, cancel: CancellationToken) {
        let mut ticker = time::interval(self.timing.analysis_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = AnalyzerState::new();
        let mut cooldown = ActionCooldown::new(self.timing.action_cooldown);
        let mut scroll_deadline: Option<Instant> = None;

        tracing::info!(context = %self.id, "monitoring started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    self.pass(&mut state, &mut cooldown, Trigger::Interval, &cancel);
                }

                Some(()) = scroll_rx.recv() => {
                    scroll_deadline = Some(Instant::now() + self.timing.scroll_debounce);
                }

                _ = time::sleep_until(scroll_deadline.unwrap_or_else(Instant::now)),
                    if scroll_deadline.is_some() =>
                {
                    scroll_deadline = None;
                    self.pass(&mut state, &mut cooldown, Trigger::Scroll, &cancel);
                }
            }
        }

        tracing::info!(context = %self.id, passes = state.tick(), "monitoring stopped");
    }

    /// One synchronous analysis pass; returns once the report is published
    fn pass(
        &self,
        state: &mut AnalyzerState,
        cooldown: &mut ActionCooldown,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> AnalysisReport {
        // Settings are read once so an update mid-pass waits for the next pass
        let settings = self.settings.snapshot();
        let texts = self.source.collect_feed_texts();
        let url = self.source.current_url();

        let report = state.run_pass(&texts, &url, settings.sensitivity, trigger);
        tracing::debug!(
            context = %self.id,
            tick = report.analysis_tick,
            %trigger,
            feed_size = report.feed_size,
            bubble_index = report.result.bubble_index,
            changed = report.changed,
            "analysis pass"
        );

        if wants_auto_action(&report, &settings) && cooldown.try_fire(Instant::now()) {
            self.schedule_action(cancel.child_token());
        }

        let envelope = ReportEnvelope {
            context_id: self.id.clone(),
            report: report.clone(),
        };
        if self.events.send(MonitorEvent::Report(envelope)).is_err() {
            tracing::trace!(context = %self.id, "no report consumers attached");
        }

        report
    }

    /// Run the page action after the configured delay unless torn down first
    fn schedule_action(&self, cancel: CancellationToken) {
        let actor = self.actor.clone();
        let id = self.id.clone();
        let delay = self.timing.action_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(context = %id, "pending auto action cancelled");
                }
                _ = time::sleep(delay) => actor.perform_action(&id),
            }
        });
    }
}
