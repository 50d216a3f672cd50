// Signal handling for graceful shutdown and manual scroll triggers

use crate::error::{BubbleError, Result};
use tokio::signal::unix::{signal, Signal as TokioSignal, SignalKind};

/// What a received signal asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    /// SIGUSR1: treated like a scroll on the watched feed
    Scroll,
}

/// Signal handler that manages multiple Unix signals
pub struct SignalHandler {
    sigterm: TokioSignal,
    sigint: TokioSignal,
    sighup: TokioSignal,
    sigusr1: TokioSignal,
}

impl SignalHandler {
    /// Sets up handlers for SIGTERM, SIGINT, SIGHUP, and SIGUSR1
    pub fn new() -> Result<Self> {
        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
            sigusr1: install(SignalKind::user_defined1(), "SIGUSR1")?,
        })
    }

    /// Wait for any signal to be received
    pub async fn wait(&mut self) -> SignalEvent {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                SignalEvent::Shutdown
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT");
                SignalEvent::Shutdown
            }
            _ = self.sighup.recv() => {
                tracing::info!("Received SIGHUP");
                SignalEvent::Shutdown
            }
            _ = self.sigusr1.recv() => {
                tracing::debug!("Received SIGUSR1");
                SignalEvent::Scroll
            }
        }
    }
}

fn install(kind: SignalKind, name: &str) -> Result<TokioSignal> {
    signal(kind).map_err(|e| BubbleError::Io {
        source: e,
        context: format!("Failed to setup {} handler", name),
    })
}
