// Monitor module: scheduling of analysis passes for independent contexts

mod action;
mod consumers;
mod context;
mod source;

pub use action::{wants_auto_action, ActionCooldown, LoggingActor, PageActor};
pub use consumers::{Badge, DispatchOutcome, ReportDispatcher, TabState, TabStates};
pub use context::ContextHandle;
pub use source::{cap_feed_texts, FileTextSource, TextSource, FALLBACK_FEED_CAP, PRIMARY_FEED_CAP};

use crate::analysis::AnalysisReport;
use crate::config::{parse_duration, MonitorConfig};
use crate::error::{BubbleError, Result};
use crate::settings::SettingsCell;
use context::ContextWorker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Identifier of one monitored context (e.g. a browser tab)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Report tagged with the context that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope {
    pub context_id: ContextId,
    pub report: AnalysisReport,
}

/// Events published on the report channel
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Produced after every pass, changed or not
    Report(ReportEnvelope),
    /// The context was torn down
    Closed(ContextId),
}

/// Timer settings shared by all contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTiming {
    pub analysis_interval: Duration,
    pub scroll_debounce: Duration,
    pub action_cooldown: Duration,
    pub action_delay: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            analysis_interval: Duration::from_secs(5),
            scroll_debounce: Duration::from_millis(750),
            action_cooldown: Duration::from_secs(15),
            action_delay: Duration::from_secs(3),
        }
    }
}

impl MonitorTiming {
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let field = |path: &str, value: &str| {
            parse_duration(value).ok_or_else(|| BubbleError::InvalidConfigValue {
                path: path.to_string(),
                message: format!("Invalid duration: {}", value),
            })
        };

        Ok(Self {
            analysis_interval: field("monitor.analysis_interval", &config.analysis_interval)?,
            scroll_debounce: field("monitor.scroll_debounce", &config.scroll_debounce)?,
            action_cooldown: field("monitor.action_cooldown", &config.action_cooldown)?,
            action_delay: field("monitor.action_delay", &config.action_delay)?,
        })
    }
}

/// Registry of running context loops
///
/// Contexts share the settings cell and the report channel and nothing else;
/// closing one never touches another.
pub struct Monitor {
    settings: SettingsCell,
    timing: MonitorTiming,
    events: broadcast::Sender<MonitorEvent>,
    contexts: HashMap<ContextId, ContextHandle>,
    shutdown: CancellationToken,
}

impl Monitor {
    pub fn new(settings: SettingsCell, timing: MonitorTiming, report_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(report_buffer.max(1));
        Self {
            settings,
            timing,
            events,
            contexts: HashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Receiver for every report and lifecycle event
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &SettingsCell {
        &self.settings
    }

    /// Start monitoring a context, replacing any loop already running under the id
    pub async fn open(
        &mut self,
        id: ContextId,
        source: Arc<dyn TextSource>,
        actor: Arc<dyn PageActor>,
    ) {
        if let Some(previous) = self.contexts.remove(&id) {
            tracing::debug!(context = %id, "replacing running context");
            previous.shutdown().await;
        }

        let worker = ContextWorker {
            id: id.clone(),
            source,
            actor,
            settings: self.settings.clone(),
            events: self.events.clone(),
            timing: self.timing,
        };
        let handle = worker.spawn(self.shutdown.child_token());
        self.contexts.insert(id, handle);
    }

    /// Forward a scroll-like event to a context
    pub fn notify_scroll(&self, id: &ContextId) -> Result<()> {
        let handle = self.contexts.get(id).ok_or_else(|| BubbleError::ContextNotFound {
            id: id.to_string(),
        })?;
        handle.notify_scroll();
        Ok(())
    }

    /// Tear down one context: cancel its timers and pending actions
    pub async fn close(&mut self, id: &ContextId) -> Result<()> {
        let handle = self
            .contexts
            .remove(id)
            .ok_or_else(|| BubbleError::ContextNotFound { id: id.to_string() })?;
        handle.shutdown().await;
        let _ = self.events.send(MonitorEvent::Closed(id.clone()));
        Ok(())
    }

    pub fn is_monitoring(&self, id: &ContextId) -> bool {
        self.contexts.contains_key(id)
    }

    pub fn active_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Tear down every context
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        let ids: Vec<ContextId> = self.contexts.keys().cloned().collect();
        for id in ids {
            if let Some(handle) = self.contexts.remove(&id) {
                handle.shutdown().await;
                let _ = self.events.send(MonitorEvent::Closed(id));
            }
        }
        tracing::info!("monitor shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_from_config() {
        let config = MonitorConfig {
            analysis_interval: "2s".to_string(),
            scroll_debounce: "300ms".to_string(),
            action_cooldown: "1m".to_string(),
            action_delay: "0ms".to_string(),
            report_buffer: 16,
        };
        let timing = MonitorTiming::from_config(&config).unwrap();
        assert_eq!(timing.analysis_interval, Duration::from_secs(2));
        assert_eq!(timing.scroll_debounce, Duration::from_millis(300));
        assert_eq!(timing.action_cooldown, Duration::from_secs(60));
        assert_eq!(timing.action_delay, Duration::ZERO);
    }

    #[test]
    fn test_timing_rejects_bad_duration() {
        let config = MonitorConfig {
            analysis_interval: "soon".to_string(),
            ..MonitorConfig::default()
        };
        assert!(MonitorTiming::from_config(&config).is_err());
    }

    #[test]
    fn test_context_id_json() {
        let envelope_json = serde_json::to_value(ContextId(42)).unwrap();
        assert_eq!(envelope_json, serde_json::json!(42));
    }
}
