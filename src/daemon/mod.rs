// Daemon module: IPC server that scores feeds pushed by clients

mod ipc;
mod service;
mod signals;
mod watch;

pub use ipc::{IpcClient, IpcMessage, IpcResponse, IpcServer};
pub use service::{ContentSnapshot, FeedOutcome, FeedService, StatusReport, STATS_UNAVAILABLE};
pub use signals::{SignalEvent, SignalHandler};
pub use watch::{run_watch, WatchOptions, WATCH_CONTEXT};

use crate::config::Config;
use crate::error::{BubbleError, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task;

/// Main daemon struct that manages the lifecycle and components
pub struct Daemon {
    config: Config,
    service: FeedService,
    ipc_server: Option<IpcServer>,
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new(config: Config) -> Result<Self> {
        let service = FeedService::open(&config)?;
        Ok(Self {
            config,
            service,
            ipc_server: None,
        })
    }

    pub fn service(&self) -> &FeedService {
        &self.service
    }

    /// Serve IPC requests until a shutdown signal or stop request
    pub async fn run_foreground(&mut self) -> Result<()> {
        tracing::info!("Daemon starting in foreground mode");

        let mut signal_handler = SignalHandler::new()?;
        let mut ipc_server = IpcServer::new(self.config.socket_path());
        ipc_server.bind().await?;
        self.ipc_server = Some(ipc_server);

        let connections = Arc::new(Semaphore::new(self.config.daemon.max_connections));
        let stop = self.service.stop_token();

        tracing::info!("Daemon started successfully");

        loop {
            let server = self
                .ipc_server
                .as_ref()
                .ok_or_else(|| BubbleError::Daemon("Server not bound".to_string()))?;

            tokio::select! {
                accepted = server.accept() => match accepted {
                    Ok(stream) => {
                        let Ok(permit) = connections.clone().try_acquire_owned() else {
                            tracing::warn!("Connection limit reached, rejecting client");
                            task::spawn(reject_client(stream));
                            continue;
                        };
                        let service = self.service.clone();
                        task::spawn(async move {
                            if let Err(e) = handle_client(stream, service).await {
                                tracing::error!("Client handler error: {}", e);
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => tracing::error!("Accept failed: {}", e),
                },

                sig = signal_handler.wait() => match sig {
                    SignalEvent::Shutdown => {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                    SignalEvent::Scroll => {
                        tracing::debug!("SIGUSR1 has no meaning for the daemon, ignoring");
                    }
                },

                _ = stop.cancelled() => {
                    tracing::info!("Stop requested over IPC");
                    break;
                }
            }
        }

        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down daemon");

        if let Some(ipc_server) = self.ipc_server.take() {
            ipc_server.shutdown()?;
        }

        tracing::info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Handle a client connection
async fn handle_client(mut stream: tokio::net::UnixStream, service: FeedService) -> Result<()> {
    let message = ipc::read_message(&mut stream).await?;

    // Database work is blocking; keep it off the reactor threads
    let response = task::spawn_blocking(move || service.handle(message))
        .await
        .map_err(|e| BubbleError::Daemon(format!("Request handler panicked: {}", e)))?;

    ipc::write_response(&mut stream, &response).await
}

async fn reject_client(mut stream: tokio::net::UnixStream) {
    let response = IpcResponse::error("Too many connections");
    if let Err(e) = ipc::write_response(&mut stream, &response).await {
        tracing::debug!("Failed to reject client: {}", e);
    }
}
