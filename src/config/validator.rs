use crate::config::{duration_ms, parse_duration, Config, SCHEMA_VERSION};
use crate::error::{BubbleError, Result, ValidationError};
use crate::history::{MAX_WINDOW_MS, MIN_WINDOW_MS};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every failure
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);

        Self::validate_storage(config, &mut errors);

        Self::validate_daemon(config, &mut errors);

        Self::validate_monitor(config, &mut errors);

        Self::validate_history(config, &mut errors);

        Self::validate_settings(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BubbleError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_daemon(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.daemon.socket_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "daemon.socket_path",
                "Socket path cannot be empty",
            ));
        }

        if config.daemon.max_connections == 0 {
            errors.push(ValidationError::new(
                "daemon.max_connections",
                "Max connections must be greater than 0",
            ));
        }
    }

    fn validate_monitor(config: &Config, errors: &mut Vec<ValidationError>) {
        let monitor = &config.monitor;
        Self::require_positive_duration(
            "monitor.analysis_interval",
            &monitor.analysis_interval,
            errors,
        );
        Self::require_positive_duration(
            "monitor.scroll_debounce",
            &monitor.scroll_debounce,
            errors,
        );
        Self::require_positive_duration(
            "monitor.action_cooldown",
            &monitor.action_cooldown,
            errors,
        );

        // Zero delay is allowed: the action then runs right after the pass
        if parse_duration(&monitor.action_delay).is_none() {
            errors.push(ValidationError::new(
                "monitor.action_delay",
                format!("Invalid duration format: {}", monitor.action_delay),
            ));
        }

        if monitor.report_buffer == 0 {
            errors.push(ValidationError::new(
                "monitor.report_buffer",
                "Report buffer must be greater than 0",
            ));
        }
    }

    fn validate_history(config: &Config, errors: &mut Vec<ValidationError>) {
        let history = &config.history;
        Self::require_positive_duration("history.max_age", &history.max_age, errors);

        if history.max_entries == 0 {
            errors.push(ValidationError::new(
                "history.max_entries",
                "Max entries must be greater than 0",
            ));
        }

        match parse_duration(&history.default_window) {
            Some(window) => {
                let window_ms = duration_ms(window);
                if !(MIN_WINDOW_MS..=MAX_WINDOW_MS).contains(&window_ms) {
                    errors.push(ValidationError::new(
                        "history.default_window",
                        format!(
                            "Default window must be between 1h and 7d, got {}",
                            history.default_window
                        ),
                    ));
                }
            }
            None => errors.push(ValidationError::new(
                "history.default_window",
                format!("Invalid duration format: {}", history.default_window),
            )),
        }
    }

    fn validate_settings(config: &Config, errors: &mut Vec<ValidationError>) {
        let sensitivity = config.settings.sensitivity;
        if !(0.0..=1.0).contains(&sensitivity) {
            errors.push(ValidationError::new(
                "settings.sensitivity",
                format!("Sensitivity must be between 0.0 and 1.0, got {}", sensitivity),
            ));
        }

        for (name, profile) in &config.profiles {
            if let Some(sensitivity) = profile.sensitivity {
                if !(0.0..=1.0).contains(&sensitivity) {
                    errors.push(ValidationError::new(
                        format!("profiles.{}.sensitivity", name),
                        format!("Sensitivity must be between 0.0 and 1.0, got {}", sensitivity),
                    ));
                }
            }
            if let Some(interval) = &profile.analysis_interval {
                Self::require_positive_duration(
                    &format!("profiles.{}.analysis_interval", name),
                    interval,
                    errors,
                );
            }
        }
    }

    fn require_positive_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        match parse_duration(value) {
            Some(duration) if !duration.is_zero() => {}
            Some(_) => errors.push(ValidationError::new(
                path,
                "Duration must be greater than 0",
            )),
            None => errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileOverrides;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_sensitivity() {
        let mut config = Config::default();
        config.settings.sensitivity = 1.5;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_interval() {
        let mut config = Config::default();
        config.monitor.analysis_interval = "0s".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_action_delay_allowed() {
        let mut config = Config::default();
        config.monitor.action_delay = "0ms".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_window_out_of_range() {
        let mut config = Config::default();
        config.history.default_window = "30m".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.history.default_window = "8d".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.history.default_window = "1d".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.history.max_entries = 0;
        config.monitor.report_buffer = 0;
        config.profiles.insert(
            "broken".to_string(),
            ProfileOverrides {
                sensitivity: Some(-0.1),
                ..ProfileOverrides::default()
            },
        );

        match ConfigValidator::validate(&config) {
            Err(BubbleError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("Expected validation failure, got {:?}", other),
        }
    }
}
