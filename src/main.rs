use bubblewatch::analysis::score;
use bubblewatch::cli::{Cli, Commands, ConfigAction};
use bubblewatch::config::Config;
use bubblewatch::daemon::{
    run_watch, ContentSnapshot, Daemon, IpcClient, IpcMessage, StatusReport, WatchOptions,
    STATS_UNAVAILABLE,
};
use bubblewatch::error::{BubbleError, Result};
use bubblewatch::explore::resolve_target;
use bubblewatch::history::{clamp_window_ms, window_preset, HistoryStore};
use bubblewatch::monitor::cap_feed_texts;
use bubblewatch::settings::SettingsStore;
use bubblewatch::storage::{format_size, StorageManager};
use std::io::Read;
use std::path::PathBuf;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve => {
            cmd_serve(cli.config, cli.profile)?;
        }
        Commands::Stop => {
            cmd_stop(cli.config, cli.profile)?;
        }
        Commands::Status => {
            cmd_status(cli.config, cli.profile)?;
        }
        Commands::Analyze {
            file,
            sensitivity,
            pretty,
        } => {
            cmd_analyze(cli.config, cli.profile, file, sensitivity, pretty)?;
        }
        Commands::Watch { file, url, all } => {
            cmd_watch(cli.config, cli.profile, file, url, all)?;
        }
        Commands::Stats { window, json } => {
            cmd_stats(cli.config, cli.profile, &window, json)?;
        }
        Commands::Explore {
            keyword,
            source_url,
        } => {
            cmd_explore(cli.config, cli.profile, keyword, source_url)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = if verbose {
        "bubblewatch=debug"
    } else {
        "bubblewatch=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // Logs go to stderr so report JSON on stdout stays machine readable
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| BubbleError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_serve(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    tracing::info!("Configuration loaded successfully");

    let mut daemon = Daemon::new(config)?;
    runtime()?.block_on(daemon.run_foreground())
}

fn cmd_stop(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let client = IpcClient::new(config.socket_path());

    match runtime()?.block_on(client.send(&IpcMessage::Stop)) {
        Ok(response) if response.success => println!("✓ Daemon stopping"),
        Ok(response) => println!(
            "⚠ Daemon refused to stop: {}",
            response.message.unwrap_or_default()
        ),
        Err(BubbleError::DaemonNotRunning) => println!("Daemon is not running"),
        Err(e) => return Err(e),
    }
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let client = IpcClient::new(config.socket_path());

    println!("bubblewatch Status");
    println!("==================");

    let response = match runtime()?.block_on(client.send(&IpcMessage::Status)) {
        Ok(response) => response,
        Err(BubbleError::DaemonNotRunning) => {
            println!("\nDaemon: Stopped");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let status: StatusReport = response
        .data
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| BubbleError::Json {
            source: e,
            context: "Failed to decode daemon status".to_string(),
        })?
        .ok_or_else(|| BubbleError::Daemon("Daemon returned no status".to_string()))?;

    println!("\nDaemon: Running ({}s)", status.uptime_secs);
    println!("  Socket: {}", config.socket_path().display());
    println!("  Active contexts: {}", status.active_contexts);
    println!("  Tab states: {}", status.tab_states);
    match status.store {
        Some(store) => println!(
            "  Store: {} keys, {}",
            store.key_count,
            format_size(store.total_size_bytes)
        ),
        None => println!("  Store: unavailable"),
    }
    Ok(())
}

fn cmd_analyze(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    file: Option<PathBuf>,
    sensitivity: Option<f64>,
    pretty: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;

    let content = match &file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to read feed file: {:?}", path),
        })?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| BubbleError::Io {
                    source: e,
                    context: "Failed to read feed from stdin".to_string(),
                })?;
            buffer
        }
    };

    let texts = cap_feed_texts(content.lines().map(str::to_string), Vec::new);
    let mut settings = config.settings.clone();
    if let Some(sensitivity) = sensitivity {
        settings.sensitivity = sensitivity;
    }
    let settings = settings.sanitized();

    let snapshot = ContentSnapshot {
        result: score(&texts, settings.sensitivity),
        url: file
            .map(|path| format!("file://{}", path.display()))
            .unwrap_or_default(),
        feed_size: texts.len(),
    };
    tracing::debug!(feed_size = snapshot.feed_size, "scored feed");

    let encoded = if pretty {
        serde_json::to_string_pretty(&snapshot)
    } else {
        serde_json::to_string(&snapshot)
    }
    .map_err(|e| BubbleError::Json {
        source: e,
        context: "Failed to serialize result".to_string(),
    })?;
    println!("{}", encoded);
    Ok(())
}

fn cmd_watch(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    file: PathBuf,
    url: Option<String>,
    all_reports: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let options = WatchOptions {
        feed_path: file,
        url,
        all_reports,
    };
    runtime()?.block_on(run_watch(&config, options))
}

fn cmd_stats(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    window: &str,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;

    let requested = match window_preset(window) {
        Some(ms) => ms as f64,
        None => window.parse::<f64>().map_err(|_| BubbleError::InvalidConfigValue {
            path: "--window".to_string(),
            message: format!("Expected hour, day, week or milliseconds, got '{}'", window),
        })?,
    };
    let window_ms = clamp_window_ms(Some(requested));

    let summary = StorageManager::new(config.data_dir()).and_then(|storage| {
        let history = HistoryStore::new(storage.database.clone(), config.history.retention()?);
        history.summarize(window_ms, chrono::Utc::now().timestamp_millis())
    });
    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Failed to summarize keyword history: {}", e);
            eprintln!("{}", STATS_UNAVAILABLE);
            return Err(e);
        }
    };

    if json {
        let encoded = serde_json::to_string_pretty(&summary).map_err(|e| BubbleError::Json {
            source: e,
            context: "Failed to serialize keyword stats".to_string(),
        })?;
        println!("{}", encoded);
        return Ok(());
    }

    println!(
        "Keyword stats for the last {} ({} samples)",
        describe_window(summary.time_window_ms),
        summary.samples
    );

    if summary.top_keywords.is_empty() {
        println!("\nNo keywords recorded in this window.");
        return Ok(());
    }

    println!("\nTop keywords:");
    for (rank, entry) in summary.top_keywords.iter().enumerate() {
        println!("  {:>2}. {} ({})", rank + 1, entry.keyword, entry.count);
    }

    if !summary.top_domains.is_empty() {
        println!("\nTop domains:");
        for entry in &summary.top_domains {
            println!("  - {} ({})", entry.domain, entry.count);
        }
    }
    Ok(())
}

fn cmd_explore(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    keyword: Option<String>,
    source_url: Option<String>,
) -> Result<()> {
    let config = load_config(config_path, profile)?;

    let keyword = match keyword {
        Some(keyword) => keyword,
        None => {
            let storage = StorageManager::new(config.data_dir())?;
            let settings =
                SettingsStore::new(storage.database.clone(), config.settings.clone()).load()?;
            settings
                .primary_expansion_keyword()
                .unwrap_or_default()
                .to_string()
        }
    };

    let target = resolve_target(&keyword, source_url.as_deref())?;
    println!("{}", target.target);
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let rendered = toml::to_string_pretty(&config)?;
            println!("{}", rendered);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Profiles: {}", config.profiles.len());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'bubblewatch config init' to create one."
        );
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load_or_default(&path),
    }
}

fn describe_window(window_ms: i64) -> String {
    match window_ms {
        3_600_000 => "hour".to_string(),
        86_400_000 => "day".to_string(),
        604_800_000 => "week".to_string(),
        ms => format!("{:.1} hours", ms as f64 / 3_600_000.0),
    }
}
