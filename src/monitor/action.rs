// Automated page action: trigger condition and per-context cooldown
use std::time::Duration;
use tokio::time::Instant;

use crate::analysis::AnalysisReport;
use crate::monitor::ContextId;
use crate::settings::Settings;

/// Executes the automated page action (scroll, next-page click) for a context
pub trait PageActor: Send + Sync + 'static {
    fn perform_action(&self, context: &ContextId);
}

/// Actor that only records the request in the log
pub struct LoggingActor;

impl PageActor for LoggingActor {
    fn perform_action(&self, context: &ContextId) {
        tracing::info!(context = %context, "auto explore requested");
    }
}

/// The report asks for an auto action under the given settings
pub fn wants_auto_action(report: &AnalysisReport, settings: &Settings) -> bool {
    settings.auto_explore && report.result.repetitive
}

/// Size-one token bucket: at most one fire per cooldown window
#[derive(Debug, Clone)]
pub struct ActionCooldown {
    cooldown: Duration,
    last_fired: Option<Instant>,
}

impl ActionCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: None,
        }
    }

    /// Fire if the cooldown has elapsed since the last fire
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_fired {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_fired = Some(now);
        true
    }

    /// Time left until the next fire is allowed
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_fired {
            Some(last) => self
                .cooldown
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}
