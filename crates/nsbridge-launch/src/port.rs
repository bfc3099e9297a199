//! One-shot debug port discovery from `<tool> debug android --get-port`.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::LaunchError;
use crate::output::{OutputChannel, OutputLevel};
use crate::process::{ProcessEvent, ProcessHandle, SPAWN_FAILED_EXIT_CODE};

/// How long port discovery may wait for a matching line.
///
/// The CLI normally prints the port and exits, so the default is to wait
/// for as long as the process is alive. Set a timeout when the CLI is
/// known to hang.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortDiscoveryPolicy {
    pub timeout: Option<Duration>,
}

impl PortDiscoveryPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// e.g. "device: 030b258308e6ce89 debug port: 40001"
const PORT_PATTERN: &str = r" (\d{5})\b";

/// The compiled port pattern, built once per process.
fn port_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(PORT_PATTERN) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::error!("invalid port pattern {:?}: {}", PORT_PATTERN, e);
                None
            }
        })
        .as_ref()
}

/// Extracts a five-digit port token from a line of CLI output.
#[derive(Debug, Clone, Copy)]
pub struct PortExtractor {
    pattern: Option<&'static Regex>,
}

impl PortExtractor {
    pub fn new() -> Self {
        Self {
            pattern: port_pattern(),
        }
    }

    /// First five-digit token in `line` that is a valid port.
    pub fn extract(&self, line: &str) -> Option<u16> {
        self.pattern?
            .captures_iter(line)
            .find_map(|caps| caps.get(1)?.as_str().parse::<u16>().ok())
    }
}

impl Default for PortExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Read `process` until a line carries a port.
///
/// The first matching line wins; the handle is consumed and dropped right
/// away so no further output is read. Lines seen before the match are
/// republished on `output` at `log` level.
///
/// # Errors
///
/// - [`LaunchError::PortDiscoveryFailed`] if the process exits first.
/// - [`LaunchError::PortDiscoveryTimedOut`] if `policy.timeout` elapses.
pub async fn discover_port(
    mut process: ProcessHandle,
    policy: PortDiscoveryPolicy,
    output: &OutputChannel,
) -> Result<u16, LaunchError> {
    let extractor = PortExtractor::new();
    let scan = async {
        loop {
            match process.next_event().await {
                Some(ProcessEvent::Stdout(line)) => {
                    let port = extractor.extract(&line);
                    output.emit(line, OutputLevel::Log);
                    if let Some(port) = port {
                        return Ok(port);
                    }
                }
                Some(ProcessEvent::Stderr(line)) => {
                    tracing::warn!(target: "nsbridge::cli", "get-port: {}", line);
                }
                Some(ProcessEvent::Exited { code }) => {
                    return Err(LaunchError::PortDiscoveryFailed { exit_code: code });
                }
                None => {
                    return Err(LaunchError::PortDiscoveryFailed {
                        exit_code: SPAWN_FAILED_EXIT_CODE,
                    });
                }
            }
        }
    };

    let result = match policy.timeout {
        Some(limit) => tokio::time::timeout(limit, scan)
            .await
            .unwrap_or(Err(LaunchError::PortDiscoveryTimedOut(limit))),
        None => scan.await,
    };

    match &result {
        Ok(port) => tracing::info!(port, "discovered debug port"),
        Err(e) => tracing::warn!("debug port discovery failed: {}", e),
    }
    result
}
