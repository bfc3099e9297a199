//! Launch error types.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionError;

/// Fixed message reported when the CLI exits before the target is debuggable.
pub const EXITED_UNEXPECTEDLY: &str = "The debug process exited unexpectedly";

/// Errors from launching or attaching to a NativeScript app.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The host cannot run this platform's tooling. Raised before any spawn.
    #[error("{0}")]
    Unsupported(String),

    /// No profile exists for the requested platform name.
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    /// The CLI exited while readiness was still pending.
    #[error("The debug process exited unexpectedly")]
    ExitedUnexpectedly {
        /// Exit code of the CLI, possibly zero.
        exit_code: i32,
    },

    /// `debug` was called while a previous launch is still pending.
    #[error("a debug launch is already in progress for {platform}")]
    AlreadyLaunching {
        /// Platform of the project.
        platform: String,
    },

    /// `--get-port` exited without printing a port.
    #[error("port discovery failed: process exited with code {exit_code}")]
    PortDiscoveryFailed {
        /// Exit code of the port lookup.
        exit_code: i32,
    },

    /// `--get-port` printed nothing usable within the configured timeout.
    #[error("port discovery timed out after {0:?}")]
    PortDiscoveryTimedOut(Duration),

    /// Creating or attaching the debug connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
