//! Connections to the target's remote debugging endpoint.
//!
//! The remote protocol itself is spoken by the backend on the device; this
//! module owns the socket and exposes the capability set the adapter needs.
//! Implementations that do not speak a given protocol command report
//! [`ConnectionError::ProtocolUnavailable`].

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::platforms::PlatformKind;

/// Errors from a debug connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The TCP connection to the endpoint failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A protocol call was made before `attach`.
    #[error("debug connection is not attached")]
    NotAttached,

    /// This connection does not implement the protocol command.
    #[error("{method} is not supported by this connection")]
    ProtocolUnavailable { method: &'static str },
}

/// Capability set of a remote debugging endpoint.
#[async_trait]
pub trait DebugConnection: Send + Sync {
    /// Platform this connection talks to.
    fn platform(&self) -> PlatformKind;

    async fn attach(&self, host: &str, port: u16) -> Result<(), ConnectionError>;

    async fn is_attached(&self) -> bool;

    async fn close(&self);

    async fn set_breakpoint_by_url(
        &self,
        _url: &str,
        _line: i64,
        _column: i64,
    ) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.setBreakpointByUrl",
        })
    }

    async fn remove_breakpoint(&self, _breakpoint_id: &str) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.removeBreakpoint",
        })
    }

    async fn step_over(&self) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.stepOver",
        })
    }

    async fn step_in(&self) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.stepInto",
        })
    }

    async fn step_out(&self) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.stepOut",
        })
    }

    async fn resume(&self) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.resume",
        })
    }

    async fn pause(&self) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.pause",
        })
    }

    async fn evaluate_on_call_frame(
        &self,
        _call_frame_id: &str,
        _expression: &str,
    ) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.evaluateOnCallFrame",
        })
    }

    async fn set_pause_on_exceptions(&self, _state: &str) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.setPauseOnExceptions",
        })
    }

    async fn get_script_source(&self, _script_id: &str) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Debugger.getScriptSource",
        })
    }

    async fn get_properties(
        &self,
        _object_id: &str,
        _own_properties: bool,
    ) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Runtime.getProperties",
        })
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Runtime.evaluate",
        })
    }

    async fn set_overlay_message(&self, _message: &str) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Page.setOverlayMessage",
        })
    }

    async fn clear_overlay_message(&self) -> Result<Value, ConnectionError> {
        Err(ConnectionError::ProtocolUnavailable {
            method: "Page.clearOverlayMessage",
        })
    }
}

/// Produces a connection for a resolved platform. No retry happens here.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, platform: PlatformKind) -> Box<dyn DebugConnection>;
}

/// Uses the inspector connection type each platform's registry row names.
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectorConnectionFactory;

impl ConnectionFactory for InspectorConnectionFactory {
    fn create(&self, platform: PlatformKind) -> Box<dyn DebugConnection> {
        platform.connect()
    }
}

/// The TCP socket shared by the inspector connection types.
#[derive(Debug, Default)]
struct InspectorSocket {
    stream: Mutex<Option<TcpStream>>,
}

impl InspectorSocket {
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        tracing::info!("attached to debug endpoint {}", addr);
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    async fn disconnect(&self) {
        if self.stream.lock().await.take().is_some() {
            tracing::info!("closed debug endpoint connection");
        }
    }
}

/// WebKit inspector connection used for iOS targets.
#[derive(Debug, Default)]
pub struct WebKitConnection {
    socket: InspectorSocket,
}

impl WebKitConnection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DebugConnection for WebKitConnection {
    fn platform(&self) -> PlatformKind {
        PlatformKind::IOS
    }

    async fn attach(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        self.socket.connect(host, port).await
    }

    async fn is_attached(&self) -> bool {
        self.socket.is_connected().await
    }

    async fn close(&self) {
        self.socket.disconnect().await;
    }
}

/// V8 debugger connection used for Android targets.
#[derive(Debug, Default)]
pub struct AndroidConnection {
    socket: InspectorSocket,
}

impl AndroidConnection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DebugConnection for AndroidConnection {
    fn platform(&self) -> PlatformKind {
        PlatformKind::ANDROID
    }

    async fn attach(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        self.socket.connect(host, port).await
    }

    async fn is_attached(&self) -> bool {
        self.socket.is_connected().await
    }

    async fn close(&self) {
        self.socket.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn factory_picks_connection_by_platform() {
        let factory = InspectorConnectionFactory;
        assert_eq!(factory.create(PlatformKind::IOS).platform(), PlatformKind::IOS);
        assert_eq!(
            factory.create(PlatformKind::ANDROID).platform(),
            PlatformKind::ANDROID
        );
    }

    #[tokio::test]
    async fn attach_and_close_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let conn = AndroidConnection::new();
        assert!(!conn.is_attached().await);
        conn.attach("127.0.0.1", port).await.unwrap();
        accept.await.unwrap().unwrap();
        assert!(conn.is_attached().await);

        conn.close().await;
        assert!(!conn.is_attached().await);
    }

    #[tokio::test]
    async fn attach_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = WebKitConnection::new()
            .attach("127.0.0.1", port)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Connect { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn protocol_commands_report_unavailable() {
        let conn = WebKitConnection::new();
        let err = conn.step_over().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::ProtocolUnavailable {
                method: "Debugger.stepOver"
            }
        ));
        assert_eq!(
            conn.evaluate("1 + 1").await.unwrap_err().to_string(),
            "Runtime.evaluate is not supported by this connection"
        );
    }
}
