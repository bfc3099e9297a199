//! Client transports: stdio, or a TCP listener for adapter development.

use std::sync::Arc;

use anyhow::{Context, Result};
use nsbridge_config::Config;
use nsbridge_dap::{
    read_message, write_message, BackendAdapter, DapError, DebugSession, EventSender,
    RequestDispatcher, TransformPipeline,
};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::adapter::NsDebugAdapter;
use crate::settings::{project_settings, transform_pipeline};

/// Run one debug session over `reader`/`writer` until the client closes
/// its end.
///
/// `make_adapter` receives the sender the backend uses for events.
pub async fn run_session<R, W, F>(
    reader: R,
    writer: W,
    pipeline: TransformPipeline,
    make_adapter: F,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(EventSender) -> Arc<dyn BackendAdapter>,
{
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let adapter = make_adapter(events_tx);
    let session = Arc::new(DebugSession::new(
        RequestDispatcher::new(pipeline, adapter),
        outbound_tx,
    ));
    let events = tokio::spawn(Arc::clone(&session).forward_events(events_rx));

    let writer = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = write_message(&mut writer, &message).await {
                tracing::error!("failed to write to client: {}", e);
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let result = loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => {
                if let Err(e) = session.accept(message) {
                    tracing::warn!("skipping client message: {}", e);
                }
            }
            Ok(None) => break Ok(()),
            Err(DapError::InvalidMessage(e)) => {
                tracing::warn!("skipping malformed client message: {}", e);
            }
            Err(e) => break Err(e),
        }
    };

    session.shutdown().await;
    events.abort();
    drop(session);
    // In-flight requests still hold the session; the writer ends once they
    // have answered.
    if let Err(e) = writer.await {
        tracing::warn!("client writer ended abnormally: {}", e);
    }
    result.context("client stream failed")
}

fn adapter_factory(config: &Config) -> impl FnOnce(EventSender) -> Arc<dyn BackendAdapter> {
    let settings = project_settings(config);
    move |events: EventSender| {
        Arc::new(NsDebugAdapter::new(settings, events)) as Arc<dyn BackendAdapter>
    }
}

/// Serve a single session on stdin/stdout.
pub async fn serve_stdio(config: &Config) -> Result<()> {
    tracing::info!("serving debug session on stdio");
    run_session(
        tokio::io::stdin(),
        tokio::io::stdout(),
        transform_pipeline(config),
        adapter_factory(config),
    )
    .await
}

/// Accept sessions on `127.0.0.1:<port>`, one per connection.
pub async fn serve_tcp(port: u16, config: &Config) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to listen on port {port}"))?;
    tracing::info!(port, "waiting for debug clients");

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        tracing::info!(%peer, "client connected");
        let (reader, writer) = stream.into_split();
        let pipeline = transform_pipeline(config);
        let make_adapter = adapter_factory(config);
        tokio::spawn(async move {
            if let Err(e) = run_session(reader, writer, pipeline, make_adapter).await {
                tracing::error!(%peer, "session failed: {:#}", e);
            }
            tracing::info!(%peer, "client disconnected");
        });
    }
}
