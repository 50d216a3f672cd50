// Report consumers: badge, latest state per context, keyword history
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task;

use crate::analysis::AnalysisReport;
use crate::history::HistoryStore;
use crate::monitor::action::wants_auto_action;
use crate::monitor::{ContextId, MonitorEvent, ReportEnvelope};
use crate::settings::SettingsCell;

/// Indicator text and color for a bubble index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

impl Badge {
    pub fn for_index(bubble_index: u8) -> Self {
        let text = if bubble_index > 0 {
            format!("{}%", bubble_index)
        } else {
            String::new()
        };
        let color = if bubble_index >= 80 {
            "#d64545"
        } else if bubble_index >= 50 {
            "#d69b45"
        } else {
            "#3d8f52"
        };
        Self {
            text,
            color: color.to_string(),
        }
    }
}

/// Latest report of a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    #[serde(flatten)]
    pub report: AnalysisReport,
    /// Unix epoch milliseconds
    pub updated_at: i64,
}

/// Registry of the latest report per monitored context
#[derive(Clone, Default)]
pub struct TabStates {
    inner: Arc<Mutex<HashMap<ContextId, TabState>>>,
}

impl TabStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, context: ContextId, report: AnalysisReport, updated_at: i64) {
        let mut states = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        states.insert(context, TabState { report, updated_at });
    }

    pub fn get(&self, context: &ContextId) -> Option<TabState> {
        let states = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        states.get(context).cloned()
    }

    pub fn remove(&self, context: &ContextId) -> Option<TabState> {
        let mut states = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        states.remove(context)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the consumers did with one report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub badge: Badge,
    pub history_recorded: bool,
    /// Settings and report ask for the auto action; cooldown not yet applied
    pub auto_explore: bool,
}

/// Fans a report out to the badge, tab state registry and keyword history
#[derive(Clone)]
pub struct ReportDispatcher {
    history: HistoryStore,
    tabs: TabStates,
    settings: SettingsCell,
}

impl ReportDispatcher {
    pub fn new(history: HistoryStore, tabs: TabStates, settings: SettingsCell) -> Self {
        Self {
            history,
            tabs,
            settings,
        }
    }

    pub fn tabs(&self) -> &TabStates {
        &self.tabs
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Deliver one report to every consumer
    ///
    /// History failures are logged and reported as not recorded; they never
    /// propagate to the analysis loop.
    pub fn dispatch(&self, envelope: &ReportEnvelope, now_ms: i64) -> DispatchOutcome {
        let report = &envelope.report;
        self.tabs.set(envelope.context_id.clone(), report.clone(), now_ms);

        let badge = Badge::for_index(report.result.bubble_index);

        let history_recorded = match self.history.append_report(report, now_ms) {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::error!(
                    context = %envelope.context_id,
                    "Failed to record keyword history: {}",
                    e
                );
                false
            }
        };

        let auto_explore = wants_auto_action(report, &self.settings.snapshot());

        tracing::debug!(
            context = %envelope.context_id,
            bubble_index = report.result.bubble_index,
            changed = report.changed,
            history_recorded,
            "report dispatched"
        );

        DispatchOutcome {
            badge,
            history_recorded,
            auto_explore,
        }
    }

    /// Drop everything held for a torn down context
    pub fn forget(&self, context: &ContextId) {
        self.tabs.remove(context);
    }

    /// Consume monitor events until every sender is dropped
    ///
    /// Reports still buffered when the monitor shuts down are delivered
    /// before this returns.
    pub async fn run(self, mut events: broadcast::Receiver<MonitorEvent>) {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::Report(envelope)) => {
                    let dispatcher = self.clone();
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    // History appends wait on the database write lock
                    let dispatched = task::spawn_blocking(move || {
                        dispatcher.dispatch(&envelope, now_ms);
                    })
                    .await;
                    if let Err(e) = dispatched {
                        tracing::error!("Report dispatch failed: {}", e);
                    }
                }
                Ok(MonitorEvent::Closed(context)) => self.forget(&context),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Report consumer lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("report dispatcher stopped");
    }
}
