// Foreground monitoring of a text file treated as a feed

use crate::config::Config;
use crate::daemon::service::FeedService;
use crate::daemon::signals::{SignalEvent, SignalHandler};
use crate::error::Result;
use crate::monitor::{
    ContextId, FileTextSource, LoggingActor, Monitor, MonitorEvent, MonitorTiming,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Context id used for the single watched file
pub const WATCH_CONTEXT: ContextId = ContextId(1);

/// Options of one watch session
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub feed_path: PathBuf,
    /// URL reported for the feed; defaults to a `file://` URL
    pub url: Option<String>,
    /// Print every report rather than only changed ones
    pub all_reports: bool,
}

/// Monitor `options.feed_path` until a shutdown signal arrives
///
/// SIGUSR1 is forwarded as a scroll event, so repeated signals collapse
/// into one debounced pass.
pub async fn run_watch(config: &Config, options: WatchOptions) -> Result<()> {
    let service = FeedService::open(config)?;
    let timing = MonitorTiming::from_config(&config.monitor)?;
    let mut monitor = Monitor::new(
        service.settings().clone(),
        timing,
        config.monitor.report_buffer,
    );

    let dispatcher = tokio::spawn(service.dispatcher().clone().run(monitor.subscribe()));
    let printer = tokio::spawn(print_reports(
        monitor.subscribe(),
        options.all_reports,
        std::io::stdout(),
    ));

    let source = match options.url {
        Some(url) => FileTextSource::with_url(options.feed_path.clone(), url),
        None => FileTextSource::new(options.feed_path.clone()),
    };
    monitor
        .open(WATCH_CONTEXT, Arc::new(source), Arc::new(LoggingActor))
        .await;

    tracing::info!(
        "Watching {:?} every {:?} (send SIGUSR1 to trigger a scroll pass)",
        options.feed_path,
        timing.analysis_interval
    );

    let mut signals = SignalHandler::new()?;
    loop {
        match signals.wait().await {
            SignalEvent::Shutdown => break,
            SignalEvent::Scroll => {
                if let Err(e) = monitor.notify_scroll(&WATCH_CONTEXT) {
                    tracing::warn!("Scroll ignored: {}", e);
                }
            }
        }
    }

    // Dropping the last sender lets both consumers drain what is buffered
    monitor.shutdown().await;
    drop(monitor);

    if let Err(e) = dispatcher.await {
        tracing::error!("Report dispatcher ended abnormally: {}", e);
    }
    match printer.await {
        Ok(printed) => tracing::info!(printed, "watch stopped"),
        Err(e) => tracing::error!("Report printer ended abnormally: {}", e),
    }
    Ok(())
}

/// Write reports as JSON lines until every sender is dropped
///
/// Returns the number of reports written.
async fn print_reports<W: Write>(
    mut events: broadcast::Receiver<MonitorEvent>,
    all_reports: bool,
    mut out: W,
) -> usize {
    let mut printed = 0;
    loop {
        match events.recv().await {
            Ok(MonitorEvent::Report(envelope)) => {
                if !all_reports && !envelope.report.changed {
                    continue;
                }
                match serde_json::to_string(&envelope.report) {
                    Ok(line) => match writeln!(out, "{}", line) {
                        Ok(()) => printed += 1,
                        Err(e) => tracing::error!("Failed to write report: {}", e),
                    },
                    Err(e) => tracing::error!("Failed to encode report: {}", e),
                }
            }
            Ok(MonitorEvent::Closed(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Report printer lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = out.flush();
    printed
}
