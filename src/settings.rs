//! User settings
//!
//! `Settings` is the process-wide record read by every monitored context.
//! Changes go through a [`SettingsCell`]; analysis passes take a snapshot at
//! their start, so an update only ever applies from the next pass on.

use crate::error::{BubbleError, Result};
use crate::storage::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Storage key of the persisted settings record
pub const SETTINGS_KEY: &str = "settings";

pub const DEFAULT_SENSITIVITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Trigger the page action when the feed turns repetitive
    pub auto_explore: bool,
    pub interest_expansion: bool,
    /// Repetitive threshold as a fraction of the bubble index
    pub sensitivity: f64,
    /// Comma separated keywords offered for exploration
    pub expansion_keywords: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_explore: true,
            interest_expansion: true,
            sensitivity: DEFAULT_SENSITIVITY,
            expansion_keywords: String::new(),
        }
    }
}

impl Settings {
    /// Clamp sensitivity into [0, 1]; non-finite values reset to the default
    pub fn sanitized(mut self) -> Self {
        self.sensitivity = if self.sensitivity.is_finite() {
            self.sensitivity.clamp(0.0, 1.0)
        } else {
            DEFAULT_SENSITIVITY
        };
        self
    }

    /// First comma separated entry of `expansion_keywords`, if any
    pub fn primary_expansion_keyword(&self) -> Option<&str> {
        self.expansion_keywords
            .split(',')
            .next()
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
    }

    /// Overlay stored fields onto `defaults`, key by key
    ///
    /// Unknown keys are ignored and fields of the wrong type keep the default.
    pub fn merge_stored(defaults: &Settings, stored: &serde_json::Value) -> Settings {
        let mut merged = match serde_json::to_value(defaults) {
            Ok(value) => value,
            Err(_) => return defaults.clone(),
        };

        if let (Some(target), Some(source)) = (merged.as_object_mut(), stored.as_object()) {
            for (key, value) in source {
                if !target.contains_key(key) {
                    continue;
                }
                let previous = target.insert(key.clone(), value.clone());
                if serde_json::from_value::<Settings>(serde_json::Value::Object(target.clone()))
                    .is_err()
                {
                    tracing::warn!("Ignoring stored setting {} with unexpected type", key);
                    if let Some(previous) = previous {
                        target.insert(key.clone(), previous);
                    }
                }
            }
        }

        serde_json::from_value::<Settings>(merged)
            .unwrap_or_else(|_| defaults.clone())
            .sanitized()
    }
}

/// Observable settings cell shared by all monitored contexts
#[derive(Clone)]
pub struct SettingsCell {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsCell {
    pub fn new(initial: Settings) -> Self {
        let (tx, _rx) = watch::channel(initial.sanitized());
        Self { tx: Arc::new(tx) }
    }

    /// Consistent copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every update
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Replace the settings as a whole
    pub fn replace(&self, settings: Settings) {
        let settings = settings.sanitized();
        tracing::debug!(
            sensitivity = settings.sensitivity,
            auto_explore = settings.auto_explore,
            "settings updated"
        );
        self.tx.send_replace(settings);
    }

    /// Apply an in-place modification atomically
    pub fn modify(&self, f: impl FnOnce(&mut Settings)) {
        self.tx.send_modify(|settings| {
            f(settings);
            *settings = settings.clone().sanitized();
        });
    }
}

impl Default for SettingsCell {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Settings persisted in the key-value database
#[derive(Clone)]
pub struct SettingsStore {
    database: Database,
    defaults: Settings,
}

impl SettingsStore {
    pub fn new(database: Database, defaults: Settings) -> Self {
        Self { database, defaults }
    }

    /// Stored settings merged over the defaults
    pub fn load(&self) -> Result<Settings> {
        let Some(raw) = self.database.get_value(SETTINGS_KEY)? else {
            return Ok(self.defaults.clone());
        };

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(stored) => Ok(Settings::merge_stored(&self.defaults, &stored)),
            Err(e) => {
                tracing::warn!("Stored settings are unreadable, using defaults: {}", e);
                Ok(self.defaults.clone())
            }
        }
    }

    /// Write back the merged record so every default key is present
    pub fn initialize(&self) -> Result<Settings> {
        let settings = self.load()?;
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let encoded = serde_json::to_string(settings).map_err(|e| BubbleError::Json {
            source: e,
            context: "Failed to serialize settings".to_string(),
        })?;
        self.database.set_value(SETTINGS_KEY, &encoded)
    }
}
