//! nsbridge-launch: starts the NativeScript CLI in a debuggable state.
//!
//! This crate assembles CLI invocations, supervises the spawned process,
//! watches its output for the platform's readiness phrases, discovers the
//! debug port, and produces connections to the target's debugging endpoint.

pub mod command;
pub mod connection;
pub mod error;
pub mod output;
pub mod platforms;
pub mod port;
pub mod process;
pub mod project;
pub mod readiness;

pub use command::{assemble, Invocation, InvocationBuilder, Param};
pub use connection::{
    AndroidConnection, ConnectionError, ConnectionFactory, DebugConnection,
    InspectorConnectionFactory, WebKitConnection,
};
pub use error::LaunchError;
pub use output::{OutputChannel, OutputLevel, OutputMessage};
pub use port::{discover_port, PortDiscoveryPolicy, PortExtractor};
pub use process::{ProcessEvent, ProcessHandle, ProcessSpawner, SystemSpawner, SPAWN_FAILED_EXIT_CODE};
pub use platforms::PlatformKind;
pub use project::{LaunchArgs, PlatformProfile, PortSource, Project, ProjectSettings};
pub use readiness::{
    await_readiness, DetectorState, Phrase, ReadinessDetector, ReadinessProfile, Transition,
};
