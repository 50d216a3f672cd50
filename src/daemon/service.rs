// Request handling shared by every IPC connection

use crate::analysis::{score, AnalysisReport, AnalyzerState, RepetitionResult};
use crate::config::Config;
use crate::daemon::ipc::{IpcMessage, IpcResponse};
use crate::error::Result;
use crate::explore::resolve_target;
use crate::history::{clamp_window_ms, HistoryStore};
use crate::monitor::{
    cap_feed_texts, wants_auto_action, ActionCooldown, Badge, ContextId, MonitorTiming,
    ReportDispatcher, ReportEnvelope, TabStates,
};
use crate::settings::{Settings, SettingsCell, SettingsStore};
use crate::storage::{DbStats, StorageManager};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Message returned whenever the keyword summary cannot be computed
pub const STATS_UNAVAILABLE: &str = "Stats unavailable right now.";

/// Per-context state for clients that push their own feed texts
struct Session {
    state: AnalyzerState,
    cooldown: ActionCooldown,
}

/// Result of a pass or pushed report, as seen by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedOutcome {
    pub report: AnalysisReport,
    pub badge: Badge,
    pub history_recorded: bool,
    /// Client should run its page action after `action_delay_ms`
    pub auto_action: bool,
    pub action_delay_ms: u64,
}

/// Score of the current feed, detached from any context state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    #[serde(flatten)]
    pub result: RepetitionResult,
    pub url: String,
    pub feed_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub active_contexts: usize,
    pub tab_states: usize,
    pub uptime_secs: u64,
    /// Absent when the database could not be read
    pub store: Option<DbStats>,
}

/// Shared daemon state behind the IPC handlers
#[derive(Clone)]
pub struct FeedService {
    sessions: Arc<Mutex<HashMap<ContextId, Session>>>,
    dispatcher: ReportDispatcher,
    settings: SettingsCell,
    settings_store: SettingsStore,
    timing: MonitorTiming,
    default_window_ms: i64,
    started: Instant,
    stop: CancellationToken,
}

impl FeedService {
    /// Open storage under the configured data directory and load persisted settings
    pub fn open(config: &Config) -> Result<Self> {
        let storage = StorageManager::new(config.data_dir())?;
        let history = HistoryStore::new(storage.database.clone(), config.history.retention()?);
        let settings_store = SettingsStore::new(storage.database.clone(), config.settings.clone());
        let timing = MonitorTiming::from_config(&config.monitor)?;

        let settings = SettingsCell::new(settings_store.initialize()?);
        let dispatcher = ReportDispatcher::new(history, TabStates::new(), settings.clone());

        Ok(Self::new(
            dispatcher,
            settings,
            settings_store,
            timing,
            config.history.default_window_ms()?,
        ))
    }

    pub fn new(
        dispatcher: ReportDispatcher,
        settings: SettingsCell,
        settings_store: SettingsStore,
        timing: MonitorTiming,
        default_window_ms: i64,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            dispatcher,
            settings,
            settings_store,
            timing,
            default_window_ms,
            started: Instant::now(),
            stop: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &SettingsCell {
        &self.settings
    }

    pub fn dispatcher(&self) -> &ReportDispatcher {
        &self.dispatcher
    }

    /// Token cancelled once a stop request arrives
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Handle one request
    pub fn handle(&self, message: IpcMessage) -> IpcResponse {
        match message {
            IpcMessage::AnalyzeFeed {
                context_id,
                url,
                texts,
                trigger,
            } => {
                let settings = self.settings.snapshot();
                let texts = cap_feed_texts(texts, Vec::new);
                let report = self.with_session(&context_id, |session| {
                    session
                        .state
                        .run_pass(&texts, &url, settings.sensitivity, trigger)
                });
                IpcResponse::from_serializable(&self.deliver(context_id, report, &settings))
            }
            IpcMessage::AnalysisReport { context_id, report } => {
                let settings = self.settings.snapshot();
                IpcResponse::from_serializable(&self.deliver(context_id, report, &settings))
            }
            IpcMessage::GetContentSnapshot { url, texts } => {
                let texts = cap_feed_texts(texts, Vec::new);
                let snapshot = ContentSnapshot {
                    result: score(&texts, self.settings.snapshot().sensitivity),
                    url,
                    feed_size: texts.len(),
                };
                IpcResponse::from_serializable(&snapshot)
            }
            IpcMessage::GetKeywordStats { time_window_ms } => {
                let window_ms =
                    clamp_window_ms(time_window_ms.or(Some(self.default_window_ms as f64)));
                let now_ms = chrono::Utc::now().timestamp_millis();
                match self.dispatcher.history().summarize(window_ms, now_ms) {
                    Ok(summary) => IpcResponse::from_serializable(&summary),
                    Err(e) => {
                        tracing::error!("Failed to summarize keyword history: {}", e);
                        IpcResponse::error(STATS_UNAVAILABLE)
                    }
                }
            }
            IpcMessage::GetTabState { context_id } => {
                IpcResponse::from_serializable(&self.dispatcher.tabs().get(&context_id))
            }
            IpcMessage::RunKeywordExpansion {
                keyword,
                source_url,
            } => {
                let settings = self.settings.snapshot();
                let keyword = keyword
                    .or_else(|| settings.primary_expansion_keyword().map(str::to_string))
                    .unwrap_or_default();
                match resolve_target(&keyword, source_url.as_deref()) {
                    Ok(target) => {
                        tracing::info!(
                            keyword = %target.keyword,
                            target = %target.target,
                            "keyword expansion"
                        );
                        IpcResponse::from_serializable(&target)
                    }
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcMessage::GetSettings => IpcResponse::from_serializable(&self.settings.snapshot()),
            IpcMessage::UpdateSettings { settings } => self.update_settings(&settings),
            IpcMessage::CloseContext { context_id } => {
                self.close_context(&context_id);
                IpcResponse::success(format!("Context {} closed", context_id))
            }
            IpcMessage::Status => IpcResponse::from_serializable(&self.status()),
            IpcMessage::Stop => {
                self.stop.cancel();
                IpcResponse::success("Shutdown initiated")
            }
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            active_contexts: self.lock_sessions().len(),
            tab_states: self.dispatcher.tabs().len(),
            uptime_secs: self.started.elapsed().as_secs(),
            store: self
                .dispatcher
                .history()
                .store_stats()
                .map_err(|e| tracing::warn!("Failed to read store stats: {}", e))
                .ok(),
        }
    }

    /// Forget the context's digest, cooldown and tab state
    pub fn close_context(&self, context_id: &ContextId) {
        self.lock_sessions().remove(context_id);
        self.dispatcher.forget(context_id);
        tracing::debug!(context = %context_id, "context closed");
    }

    fn update_settings(&self, partial: &serde_json::Value) -> IpcResponse {
        let merged: Settings = Settings::merge_stored(&self.settings.snapshot(), partial);
        if let Err(e) = self.settings_store.save(&merged) {
            tracing::error!("Failed to persist settings: {}", e);
            return IpcResponse::error("Failed to save settings");
        }
        self.settings.replace(merged.clone());
        IpcResponse::from_serializable(&merged)
    }

    /// Fan a report out to the consumers and apply the action cooldown
    fn deliver(
        &self,
        context_id: ContextId,
        report: AnalysisReport,
        settings: &Settings,
    ) -> FeedOutcome {
        let auto_action = wants_auto_action(&report, settings)
            && self.with_session(&context_id, |session| session.cooldown.try_fire(Instant::now()));

        let envelope = ReportEnvelope { context_id, report };
        let outcome = self
            .dispatcher
            .dispatch(&envelope, chrono::Utc::now().timestamp_millis());

        FeedOutcome {
            report: envelope.report,
            badge: outcome.badge,
            history_recorded: outcome.history_recorded,
            auto_action,
            action_delay_ms: self.timing.action_delay.as_millis() as u64,
        }
    }

    fn with_session<T>(&self, context_id: &ContextId, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut sessions = self.lock_sessions();
        let session = sessions.entry(context_id.clone()).or_insert_with(|| Session {
            state: AnalyzerState::new(),
            cooldown: ActionCooldown::new(self.timing.action_cooldown),
        });
        f(session)
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<ContextId, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
