//! Client-facing debug session.
//!
//! Receives raw client messages, logs them, hands requests to the
//! [`RequestDispatcher`] and writes responses and events to the outbound
//! channel with fresh sequence numbers.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dispatcher::RequestDispatcher;
use crate::error::DapError;
use crate::protocol::{Event, Request, Response};

/// Serialized messages bound for the client.
pub type Outbound = mpsc::UnboundedSender<Value>;

/// Events the backend wants delivered to the client.
pub type EventSender = mpsc::UnboundedSender<Event>;

pub struct DebugSession {
    dispatcher: RequestDispatcher,
    outbound: Outbound,
    next_seq: AtomicI64,
}

impl DebugSession {
    pub fn new(dispatcher: RequestDispatcher, outbound: Outbound) -> Self {
        Self {
            dispatcher,
            outbound,
            next_seq: AtomicI64::new(1),
        }
    }

    fn next_seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Decode one inbound message and, if it is a request, handle it on
    /// its own task so slow requests do not block later ones.
    pub fn accept(self: &Arc<Self>, message: Value) -> Result<(), DapError> {
        match message.get("type").and_then(Value::as_str) {
            Some("request") => {
                let request: Request = serde_json::from_value(message)
                    .map_err(|e| DapError::InvalidMessage(format!("bad request: {e}")))?;
                let session = Arc::clone(self);
                tokio::spawn(async move { session.handle_request(request).await });
                Ok(())
            }
            Some(other) => {
                tracing::debug!("ignoring client {} message", other);
                Ok(())
            }
            None => Err(DapError::InvalidMessage("message has no type".into())),
        }
    }

    pub async fn handle_request(&self, request: Request) {
        tracing::info!(
            "From client: {}({})",
            request.command,
            request
                .arguments
                .as_ref()
                .map(serde_json::Value::to_string)
                .unwrap_or_default()
        );
        let response = self.dispatcher.dispatch(&request).await;
        if let Err(e) = self.send_response(response) {
            tracing::warn!("dropping response to {}: {}", request.command, e);
        }
    }

    pub fn send_response(&self, mut response: Response) -> Result<(), DapError> {
        response.seq = self.next_seq();
        self.send("response", &response, true)
    }

    /// Send an event after mapping it back through the pipeline.
    ///
    /// `output` events are not logged; the log itself may be streamed to
    /// the client as output.
    pub fn send_event(&self, mut event: Event) -> Result<(), DapError> {
        self.dispatcher.pipeline().transform_event(&mut event);
        event.seq = self.next_seq();
        let log = event.event != "output";
        self.send("event", &event, log)
    }

    /// The client stream ended.
    pub async fn shutdown(&self) {
        tracing::info!("client disconnected, shutting down session");
        self.dispatcher.shutdown().await;
    }

    /// Deliver backend events until every [`EventSender`] is dropped.
    pub async fn forward_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            if self.send_event(event).is_err() {
                break;
            }
        }
    }

    fn send<T: Serialize>(&self, kind: &str, message: &T, log: bool) -> Result<(), DapError> {
        let value = serde_json::to_value(message)
            .map_err(|e| DapError::InvalidMessage(format!("cannot serialize {kind}: {e}")))?;
        if log {
            tracing::info!("To client: {}", value);
        }
        self.outbound
            .send(value)
            .map_err(|_| DapError::ChannelClosed)
    }
}
