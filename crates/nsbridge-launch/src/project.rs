//! Per-session launch orchestration.
//!
//! A [`Project`] is an app root plus a [`PlatformProfile`]. It builds the CLI
//! invocation, spawns it, waits for readiness, and afterwards keeps
//! forwarding the CLI's output until the session ends.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nsbridge_platform::SystemInfo;
use tokio::task::JoinHandle;

use crate::command::{assemble, Invocation, Param};
use crate::connection::{ConnectionFactory, DebugConnection, InspectorConnectionFactory};
use crate::error::LaunchError;
use crate::output::{OutputChannel, OutputLevel};
use crate::platforms::PlatformKind;
use crate::port::{discover_port, PortDiscoveryPolicy};
use crate::process::{ProcessEvent, ProcessHandle, ProcessSpawner, SystemSpawner};
use crate::readiness::{await_readiness, Phrase, ReadinessDetector, ReadinessProfile};

/// What the client asked for, decoded once from `launch`/`attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchArgs {
    Attach { emulator: bool },
    Launch { emulator: bool, stop_on_entry: bool },
}

impl LaunchArgs {
    pub fn emulator(&self) -> bool {
        match *self {
            LaunchArgs::Attach { emulator } | LaunchArgs::Launch { emulator, .. } => emulator,
        }
    }

    pub fn is_attach(&self) -> bool {
        matches!(self, LaunchArgs::Attach { .. })
    }

    /// The DAP request name this was decoded from.
    pub fn request_name(&self) -> &'static str {
        if self.is_attach() {
            "attach"
        } else {
            "launch"
        }
    }
}

/// Launch settings shared by every platform, usually mapped from the
/// user's configuration.
#[derive(Debug, Clone)]
pub struct ProjectSettings {
    pub tool: String,
    pub env: HashMap<String, String>,
    /// Appended after `--no-client`.
    pub extra_args: Vec<String>,
    pub ios_debug_port: u16,
    pub ios_attach_grace: Duration,
    pub ios_proxy_ready_phrase: String,
    pub ios_cli_ready_phrase: String,
    pub ios_backend_ready_phrase: String,
    pub android_started_phrase: String,
    /// Wait after the android readiness phrase so adb can bind the socket.
    pub android_launch_settle: Duration,
    pub port_discovery: PortDiscoveryPolicy,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            tool: "tns".to_string(),
            env: HashMap::new(),
            extra_args: Vec::new(),
            ios_debug_port: 18181,
            ios_attach_grace: Duration::from_millis(1500),
            ios_proxy_ready_phrase: "Press Ctrl + C to terminate, or disconnect.".to_string(),
            ios_cli_ready_phrase: "Supressing debugging client.".to_string(),
            ios_backend_ready_phrase: "NativeScript waiting for debugger.".to_string(),
            android_started_phrase: "# NativeScript Debugger started #".to_string(),
            android_launch_settle: Duration::from_millis(500),
            port_discovery: PortDiscoveryPolicy::default(),
        }
    }
}

/// Where the debug port comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    Fixed(u16),
    /// Asked from `<tool> debug <platform> --get-port`.
    Discovered,
}

/// Everything that differs between platforms at launch time, as data.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    kind: PlatformKind,
    launch: ReadinessProfile,
    /// `None` means attach needs no CLI process.
    attach: Option<ReadinessProfile>,
    launch_settle: Duration,
    port: PortSource,
}

/// iOS launch waits for the proxy, the CLI and the backend; the debug port
/// is fixed.
pub(crate) fn ios_profile(kind: PlatformKind, settings: &ProjectSettings) -> PlatformProfile {
    let proxy = Phrase::contains("proxy-ready", settings.ios_proxy_ready_phrase.clone());
    let cli = Phrase::contains("cli-ready", settings.ios_cli_ready_phrase.clone());
    let backend = Phrase::contains("backend-ready", settings.ios_backend_ready_phrase.clone());
    PlatformProfile {
        kind,
        launch: ReadinessProfile::new(vec![proxy.clone(), cli.clone(), backend], Duration::ZERO),
        // The backend is already running and never prints its phrase again.
        attach: Some(ReadinessProfile::new(vec![proxy, cli], settings.ios_attach_grace)),
        launch_settle: Duration::ZERO,
        port: PortSource::Fixed(settings.ios_debug_port),
    }
}

/// Android launch waits for one phrase and then settles; attach spawns
/// nothing and the port is asked from the CLI.
pub(crate) fn android_profile(kind: PlatformKind, settings: &ProjectSettings) -> PlatformProfile {
    PlatformProfile {
        kind,
        launch: ReadinessProfile::new(
            vec![Phrase::contains(
                "debugger-started",
                settings.android_started_phrase.clone(),
            )],
            Duration::ZERO,
        ),
        attach: None,
        launch_settle: settings.android_launch_settle,
        port: PortSource::Discovered,
    }
}

impl PlatformProfile {
    pub fn new(kind: PlatformKind, settings: &ProjectSettings) -> Self {
        kind.profile(settings)
    }

    pub fn kind(&self) -> PlatformKind {
        self.kind
    }

    pub fn port_source(&self) -> PortSource {
        self.port
    }

    /// Fail early when this host cannot run the platform's tooling.
    pub fn check_host(&self, host: &SystemInfo) -> Result<(), LaunchError> {
        if self.kind.requires_macos() && !host.is_macos() {
            return Err(LaunchError::Unsupported(format!(
                "{} platform is supported only on Mac.",
                self.kind.display_name()
            )));
        }
        Ok(())
    }

    /// Readiness criteria for `args`, or `None` when nothing is spawned.
    pub fn readiness(&self, args: &LaunchArgs) -> Option<&ReadinessProfile> {
        match args {
            LaunchArgs::Launch { .. } => Some(&self.launch),
            LaunchArgs::Attach { .. } => self.attach.as_ref(),
        }
    }

    /// `<tool> debug <platform> [--emulator] [--start | --debug-brk] --no-client [extra..]`
    pub fn debug_invocation(&self, tool: &str, args: &LaunchArgs, extra: &[String]) -> Invocation {
        let attach = args.is_attach();
        let base = assemble(
            tool,
            &[
                Param::Always("debug"),
                Param::Always(self.kind.name()),
                Param::When("--emulator", args.emulator()),
                Param::When("--start", attach),
                Param::When("--debug-brk", !attach),
                Param::Always("--no-client"),
            ],
        );
        Invocation::builder(base.program())
            .params(base.args().iter().cloned())
            .params(extra.iter().cloned())
            .build()
    }

    /// `<tool> debug <platform> --get-port`
    pub fn port_invocation(&self, tool: &str) -> Invocation {
        assemble(
            tool,
            &[
                Param::Always("debug"),
                Param::Always(self.kind.name()),
                Param::Always("--get-port"),
            ],
        )
    }
}

/// One debug session's app root, platform and CLI process.
pub struct Project {
    app_root: PathBuf,
    profile: PlatformProfile,
    settings: ProjectSettings,
    host: SystemInfo,
    spawner: Arc<dyn ProcessSpawner>,
    connections: Arc<dyn ConnectionFactory>,
    output: OutputChannel,
    /// Forwards output of the CLI process after readiness. Aborting it
    /// drops, and so kills, the process.
    forwarder: Option<JoinHandle<()>>,
}

impl Project {
    pub fn new(app_root: impl Into<PathBuf>, platform: PlatformKind, settings: ProjectSettings) -> Self {
        let profile = PlatformProfile::new(platform, &settings);
        Self {
            app_root: app_root.into(),
            profile,
            settings,
            host: SystemInfo::detect(),
            spawner: Arc::new(SystemSpawner),
            connections: Arc::new(InspectorConnectionFactory),
            output: OutputChannel::new(),
            forwarder: None,
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connections = factory;
        self
    }

    pub fn with_host(mut self, host: SystemInfo) -> Self {
        self.host = host;
        self
    }

    pub fn platform(&self) -> PlatformKind {
        self.profile.kind()
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    /// CLI output of this project, live for as long as the project.
    pub fn output(&self) -> &OutputChannel {
        &self.output
    }

    /// Whether a CLI process started by [`Project::debug`] is still running.
    pub fn is_running(&self) -> bool {
        self.forwarder
            .as_ref()
            .is_some_and(|forwarder| !forwarder.is_finished())
    }

    /// Start the CLI in debug mode and wait until the target is debuggable.
    ///
    /// # Errors
    ///
    /// - [`LaunchError::AlreadyLaunching`] if a CLI process is still live.
    /// - [`LaunchError::Unsupported`] if this host cannot run the platform.
    /// - [`LaunchError::ExitedUnexpectedly`] if the CLI exits first.
    pub async fn debug(&mut self, args: &LaunchArgs) -> Result<(), LaunchError> {
        if self.is_running() {
            return Err(LaunchError::AlreadyLaunching {
                platform: self.platform().to_string(),
            });
        }
        self.profile.check_host(&self.host)?;

        let Some(readiness) = self.profile.readiness(args) else {
            tracing::info!(platform = %self.platform(), "attaching to running app, nothing to spawn");
            return Ok(());
        };

        if let LaunchArgs::Launch { stop_on_entry, .. } = args {
            tracing::debug!(stop_on_entry, "launch always breaks on entry via --debug-brk");
        }

        let invocation =
            self.profile
                .debug_invocation(&self.settings.tool, args, &self.settings.extra_args);
        let mut detector = ReadinessDetector::new(readiness.clone());
        let mut process = self
            .spawner
            .spawn(&invocation, &self.app_root, &self.settings.env);

        await_readiness(&mut process, &mut detector, &self.output).await?;

        if !args.is_attach() && !self.profile.launch_settle.is_zero() {
            tokio::time::sleep(self.profile.launch_settle).await;
        }

        tracing::info!(platform = %self.platform(), "{} ready", args.request_name());
        self.forwarder = Some(tokio::spawn(forward_output(process, self.output.clone())));
        Ok(())
    }

    /// Port of the target's debugging endpoint.
    pub async fn debug_port(&self) -> Result<u16, LaunchError> {
        match self.profile.port_source() {
            PortSource::Fixed(port) => Ok(port),
            PortSource::Discovered => {
                let invocation = self.profile.port_invocation(&self.settings.tool);
                let process = self
                    .spawner
                    .spawn(&invocation, &self.app_root, &self.settings.env);
                discover_port(process, self.settings.port_discovery, &self.output).await
            }
        }
    }

    /// A fresh, unattached connection for this project's platform.
    pub fn create_connection(&self) -> Box<dyn DebugConnection> {
        self.connections.create(self.platform())
    }

    /// Kill the CLI process, if any.
    pub fn terminate(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            tracing::info!(platform = %self.platform(), "terminating CLI process");
            forwarder.abort();
        }
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("app_root", &self.app_root)
            .field("platform", &self.platform())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn forward_output(mut process: ProcessHandle, output: OutputChannel) {
    while let Some(event) = process.next_event().await {
        match event {
            ProcessEvent::Stdout(line) => output.emit(line, OutputLevel::Log),
            ProcessEvent::Stderr(line) => output.emit(line, OutputLevel::Error),
            ProcessEvent::Exited { code } => {
                tracing::info!(code, "CLI process finished after launch");
            }
        }
    }
}
