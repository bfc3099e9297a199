//! Fan-out of CLI output lines to any number of subscribers.

use tokio::sync::broadcast;

/// Lines kept for slow subscribers before they start lagging.
const OUTPUT_CAPACITY: usize = 1024;

/// Severity of a forwarded output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    /// Standard output.
    Log,
    /// Standard error.
    Error,
}

impl OutputLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputLevel::Log => "log",
            OutputLevel::Error => "error",
        }
    }
}

/// A single line of CLI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub text: String,
    pub level: OutputLevel,
}

/// Broadcast channel carrying [`OutputMessage`]s.
///
/// Subscribers are independent: one dropping or lagging does not affect
/// the others or the producer.
#[derive(Debug, Clone)]
pub struct OutputChannel {
    tx: broadcast::Sender<OutputMessage>,
}

impl OutputChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(OUTPUT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutputMessage> {
        self.tx.subscribe()
    }

    /// Publish a line. Lines published with no subscribers are dropped.
    pub fn emit(&self, text: impl Into<String>, level: OutputLevel) {
        let message = OutputMessage {
            text: text.into(),
            level,
        };
        match level {
            OutputLevel::Log => tracing::debug!(target: "nsbridge::cli", "{}", message.text),
            OutputLevel::Error => tracing::warn!(target: "nsbridge::cli", "{}", message.text),
        }
        let _ = self.tx.send(message);
    }
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self::new()
    }
}
