// Inter-process communication via Unix domain sockets with length-prefixed JSON protocol

use crate::analysis::{AnalysisReport, Trigger};
use crate::error::{BubbleError, Result};
use crate::monitor::ContextId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum message size (10MB)
const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// IPC message types sent from feed clients or the CLI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IpcMessage {
    /// Run a pass for a context over the supplied feed texts
    AnalyzeFeed {
        context_id: ContextId,
        url: String,
        texts: Vec<String>,
        #[serde(default = "default_trigger")]
        trigger: Trigger,
    },
    /// Report produced by a client-side analysis loop
    AnalysisReport {
        context_id: ContextId,
        report: AnalysisReport,
    },
    /// Score a feed without touching any context state
    GetContentSnapshot { url: String, texts: Vec<String> },
    /// Windowed keyword summary; a missing window uses the configured default
    GetKeywordStats {
        #[serde(default)]
        time_window_ms: Option<f64>,
    },
    /// Latest report of a context
    GetTabState { context_id: ContextId },
    /// Resolve a search target; a missing keyword falls back to the settings
    RunKeywordExpansion {
        #[serde(default)]
        keyword: Option<String>,
        #[serde(default)]
        source_url: Option<String>,
    },
    GetSettings,
    /// Partial settings record merged over the current settings
    UpdateSettings { settings: serde_json::Value },
    /// Tear down a context
    CloseContext { context_id: ContextId },
    /// Request daemon status
    Status,
    /// Request daemon to stop
    Stop,
}

fn default_trigger() -> Trigger {
    Trigger::Interval
}

/// IPC response message sent from daemon back to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl IpcResponse {
    /// Create a successful response
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Create a successful response with data
    pub fn success_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Serialize `value` into a successful response
    pub fn from_serializable<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self::success_with_data(data),
            Err(e) => Self::error(format!("Failed to encode response: {}", e)),
        }
    }
}

/// Unix domain socket server for IPC
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
        }
    }

    /// Bind to the socket path and start listening
    pub async fn bind(&mut self) -> Result<()> {
        // Stale socket from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| BubbleError::Io {
                source: e,
                context: format!("Failed to remove existing socket: {:?}", self.socket_path),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BubbleError::Io {
                source: e,
                context: format!("Failed to create socket directory: {:?}", parent),
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to bind to socket: {:?}", self.socket_path),
        })?;

        self.listener = Some(listener);

        tracing::info!("IPC server listening on {:?}", self.socket_path);
        Ok(())
    }

    /// Accept incoming connections
    pub async fn accept(&self) -> Result<UnixStream> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| BubbleError::Daemon("Server not bound".to_string()))?;

        let (stream, _addr) = listener.accept().await.map_err(|e| BubbleError::Io {
            source: e,
            context: "Failed to accept connection".to_string(),
        })?;

        Ok(stream)
    }

    /// Shutdown the server and clean up socket file
    pub fn shutdown(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| BubbleError::Io {
                source: e,
                context: format!("Failed to remove socket: {:?}", self.socket_path),
            })?;
        }
        Ok(())
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Read one length-prefixed JSON frame
async fn read_frame<R, T>(stream: &mut R, what: &str) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    // 4-byte big-endian length prefix
    let length = stream.read_u32().await.map_err(|e| BubbleError::Io {
        source: e,
        context: format!("Failed to read {} length", what),
    })?;

    if length > MAX_MESSAGE_SIZE {
        return Err(BubbleError::Daemon(format!(
            "{} too large: {} bytes (max: {})",
            what, length, MAX_MESSAGE_SIZE
        )));
    }

    let mut buffer = vec![0u8; length as usize];
    stream
        .read_exact(&mut buffer)
        .await
        .map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to read {} payload", what),
        })?;

    serde_json::from_slice(&buffer).map_err(|e| BubbleError::Json {
        source: e,
        context: format!("Failed to deserialize {}", what),
    })
}

/// Write one length-prefixed JSON frame
async fn write_frame<W, T>(stream: &mut W, value: &T, what: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value).map_err(|e| BubbleError::Json {
        source: e,
        context: format!("Failed to serialize {}", what),
    })?;

    if payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(BubbleError::Daemon(format!(
            "{} too large: {} bytes (max: {})",
            what,
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    stream
        .write_u32(payload.len() as u32)
        .await
        .map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to write {} length", what),
        })?;

    stream
        .write_all(&payload)
        .await
        .map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to write {} payload", what),
        })?;

    stream.flush().await.map_err(|e| BubbleError::Io {
        source: e,
        context: format!("Failed to flush {}", what),
    })?;

    Ok(())
}

/// Read a length-prefixed message from a Unix stream
pub async fn read_message(stream: &mut UnixStream) -> Result<IpcMessage> {
    read_frame(stream, "IPC message").await
}

/// Write a length-prefixed response to a Unix stream
pub async fn write_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
    write_frame(stream, response, "IPC response").await
}

/// IPC client for sending messages to the daemon
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Connect to the daemon and send a message, returning the response
    pub async fn send(&self, message: &IpcMessage) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            ) {
                BubbleError::DaemonNotRunning
            } else {
                BubbleError::Io {
                    source: e,
                    context: format!("Failed to connect to daemon at {:?}", self.socket_path),
                }
            }
        })?;

        write_frame(&mut stream, message, "IPC message").await?;
        read_frame(&mut stream, "IPC response").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ipc_message_wire_format() {
        let msg = IpcMessage::AnalyzeFeed {
            context_id: ContextId(3),
            url: "https://www.youtube.com/".to_string(),
            texts: vec!["cats are great".to_string()],
            trigger: Trigger::Scroll,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "analyzeFeed");
        assert_eq!(value["contextId"], 3);
        assert_eq!(value["trigger"], "scroll");

        let decoded: IpcMessage = serde_json::from_value(value).unwrap();
        match decoded {
            IpcMessage::AnalyzeFeed { texts, .. } => assert_eq!(texts.len(), 1),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_optional_fields_default() {
        let decoded: IpcMessage = serde_json::from_value(json!({
            "type": "analyzeFeed",
            "contextId": 1,
            "url": "",
            "texts": []
        }))
        .unwrap();
        assert!(matches!(
            decoded,
            IpcMessage::AnalyzeFeed {
                trigger: Trigger::Interval,
                ..
            }
        ));

        let decoded: IpcMessage =
            serde_json::from_value(json!({ "type": "getKeywordStats" })).unwrap();
        assert!(matches!(
            decoded,
            IpcMessage::GetKeywordStats {
                time_window_ms: None
            }
        ));

        let decoded: IpcMessage = serde_json::from_value(json!({ "type": "stop" })).unwrap();
        assert!(matches!(decoded, IpcMessage::Stop));
    }

    #[test]
    fn test_ipc_response_creation() {
        let success = IpcResponse::success("Operation completed");
        assert!(success.success);
        assert_eq!(success.message.unwrap(), "Operation completed");

        let error = IpcResponse::error("Operation failed");
        assert!(!error.success);
        assert_eq!(error.message.unwrap(), "Operation failed");

        let data = IpcResponse::from_serializable(&vec![1, 2]);
        assert_eq!(data.data.unwrap(), json!([1, 2]));
    }

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &IpcMessage::Status, "IPC message")
            .await
            .unwrap();
        let received: IpcMessage = read_frame(&mut server, "IPC message").await.unwrap();
        assert!(matches!(received, IpcMessage::Status));
    }
}
