use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How the NativeScript CLI is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Executable name or path of the CLI.
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Extra environment variables for every CLI invocation
    /// (e.g. `ANDROID_HOME`).
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_tool() -> String {
    "tns".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            env: HashMap::new(),
        }
    }
}

/// iOS readiness phrases and connection settings.
///
/// The phrases are printed by the CLI; a CLI release that rewords them
/// breaks readiness detection until they are updated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IosConfig {
    /// Port of the WebKit inspector proxy.
    #[serde(default = "default_ios_port")]
    pub debug_port: u16,
    /// Grace period after the attach phrases before reporting ready.
    #[serde(default = "default_attach_grace_ms")]
    pub attach_grace_ms: u64,
    #[serde(default = "default_proxy_ready")]
    pub proxy_ready_phrase: String,
    #[serde(default = "default_cli_ready")]
    pub cli_ready_phrase: String,
    #[serde(default = "default_backend_ready")]
    pub backend_ready_phrase: String,
}

fn default_ios_port() -> u16 {
    18181
}
fn default_attach_grace_ms() -> u64 {
    1500
}
fn default_proxy_ready() -> String {
    "Press Ctrl + C to terminate, or disconnect.".to_string()
}
fn default_cli_ready() -> String {
    "Supressing debugging client.".to_string()
}
fn default_backend_ready() -> String {
    "NativeScript waiting for debugger.".to_string()
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            debug_port: default_ios_port(),
            attach_grace_ms: default_attach_grace_ms(),
            proxy_ready_phrase: default_proxy_ready(),
            cli_ready_phrase: default_cli_ready(),
            backend_ready_phrase: default_backend_ready(),
        }
    }
}

impl IosConfig {
    pub fn attach_grace(&self) -> Duration {
        Duration::from_millis(self.attach_grace_ms)
    }
}

/// Android readiness phrase and port discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndroidConfig {
    #[serde(default = "default_debugger_started")]
    pub debugger_started_phrase: String,
    /// Give up on `--get-port` after this long. Unset waits until the
    /// CLI exits.
    #[serde(default)]
    pub port_discovery_timeout_ms: Option<u64>,
    /// Pause after the readiness phrase so adb can forward the debug socket.
    #[serde(default = "default_launch_settle_ms")]
    pub launch_settle_ms: u64,
}

fn default_debugger_started() -> String {
    "# NativeScript Debugger started #".to_string()
}
fn default_launch_settle_ms() -> u64 {
    500
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self {
            debugger_started_phrase: default_debugger_started(),
            port_discovery_timeout_ms: None,
            launch_settle_ms: default_launch_settle_ms(),
        }
    }
}

impl AndroidConfig {
    pub fn port_discovery_timeout(&self) -> Option<Duration> {
        self.port_discovery_timeout_ms.map(Duration::from_millis)
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }
}

/// Request rewriting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Whether the debug target numbers lines from 1.
    #[serde(default)]
    pub target_lines_start_at1: bool,
    /// URL prefix under which the app root is deployed on the device.
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
}

fn default_remote_root() -> String {
    "file:///app/".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            target_lines_start_at1: false,
            remote_root: default_remote_root(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

/// Top-level nsbridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub ios: IosConfig,
    #[serde(default)]
    pub android: AndroidConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub log: LogConfig,
}
