//! The NativeScript backend behind the request dispatcher.
//!
//! `launch`/`attach` start the CLI through a [`Project`], discover the debug
//! port and attach a [`DebugConnection`]. Debugging commands are then
//! forwarded to that connection. CLI output is relayed to the client as
//! `output` events for as long as the project lives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use nsbridge_dap::{
    AdapterError, BackendAdapter, Breakpoint, Capabilities, EvaluateArguments, Event,
    EventSender, ExceptionBreakpointsFilter, LaunchRequestArguments, OutputCategory,
    SetBreakpointsArguments,
};
use nsbridge_launch::{
    ConnectionError, ConnectionFactory, DebugConnection, InspectorConnectionFactory, LaunchArgs,
    LaunchError, OutputChannel, OutputLevel, PlatformKind, ProcessSpawner, Project,
    ProjectSettings, SystemSpawner,
};
use nsbridge_platform::SystemInfo;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Host the target's debugging endpoint is forwarded to.
const DEBUG_HOST: &str = "localhost";

/// The only thread a NativeScript target exposes.
const MAIN_THREAD_ID: i64 = 1;

pub struct NsDebugAdapter {
    settings: ProjectSettings,
    events: EventSender,
    host: SystemInfo,
    spawner: Arc<dyn ProcessSpawner>,
    connections: Arc<dyn ConnectionFactory>,
    /// Held for the whole of a launch; a second launch fails to take it.
    project: tokio::sync::Mutex<Option<Project>>,
    connection: RwLock<Option<Arc<dyn DebugConnection>>>,
    output_forwarder: Mutex<Option<JoinHandle<()>>>,
    /// Breakpoint ids set on the target, per script url.
    breakpoints: Mutex<HashMap<String, Vec<String>>>,
    handles: Mutex<VariableHandles>,
    /// Raised while the session is being torn down; cancels a pending launch.
    closing: watch::Sender<bool>,
}

impl NsDebugAdapter {
    pub fn new(settings: ProjectSettings, events: EventSender) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            settings,
            events,
            host: SystemInfo::detect(),
            spawner: Arc::new(SystemSpawner),
            connections: Arc::new(InspectorConnectionFactory),
            project: tokio::sync::Mutex::new(None),
            connection: RwLock::new(None),
            output_forwarder: Mutex::new(None),
            breakpoints: Mutex::new(HashMap::new()),
            handles: Mutex::new(VariableHandles::default()),
            closing,
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

    fn initialize(&self) -> Value {
        let capabilities = Capabilities {
            supports_configuration_done_request: Some(true),
            supports_conditional_breakpoints: Some(true),
            supports_evaluate_for_hovers: Some(true),
            supports_function_breakpoints: Some(false),
            exception_breakpoint_filters: Some(vec![
                ExceptionBreakpointsFilter {
                    filter: "all".into(),
                    label: "All Exceptions".into(),
                    default: false,
                },
                ExceptionBreakpointsFilter {
                    filter: "uncaught".into(),
                    label: "Uncaught Exceptions".into(),
                    default: true,
                },
            ]),
        };
        serde_json::to_value(capabilities).unwrap_or(Value::Null)
    }

    async fn launch(&self, command: &str, arguments: Value) -> Result<Option<Value>, AdapterError> {
        let request: LaunchRequestArguments = serde_json::from_value(arguments)
            .map_err(|e| AdapterError::failed(format!("invalid {command} arguments: {e}")))?;
        let platform = request
            .platform
            .parse::<PlatformKind>()
            .map_err(launch_failed)?;
        let args = if command == "attach" {
            LaunchArgs::Attach {
                emulator: request.emulator,
            }
        } else {
            LaunchArgs::Launch {
                emulator: request.emulator,
                stop_on_entry: request.stop_on_entry,
            }
        };

        let already_launching = || {
            launch_failed(LaunchError::AlreadyLaunching {
                platform: platform.to_string(),
            })
        };
        let mut slot = self.project.try_lock().map_err(|_| already_launching())?;
        if slot.as_ref().is_some_and(Project::is_running) {
            return Err(already_launching());
        }

        let mut settings = self.settings.clone();
        settings.extra_args = request.tns_args;
        let project = Project::new(&request.app_root, platform, settings)
            .with_spawner(Arc::clone(&self.spawner))
            .with_connection_factory(Arc::clone(&self.connections))
            .with_host(self.host);
        self.forward_output(project.output());
        let project = slot.insert(project);

        tracing::info!(%platform, app_root = %request.app_root, "{} requested", command);
        let mut closing = self.closing.subscribe();
        let connection = tokio::select! {
            result = start(project, &args) => result.map_err(launch_failed)?,
            _ = closing.wait_for(|closing| *closing) => {
                return Err(AdapterError::failed(format!("{command} cancelled, session closing")));
            }
        };
        *self.connection.write().unwrap_or_else(PoisonError::into_inner) = Some(connection);
        drop(slot);

        self.send_event(Event::initialized());
        Ok(None)
    }

    /// Relay a project's CLI output to the client until the project is gone.
    fn forward_output(&self, output: &OutputChannel) {
        let mut lines = output.subscribe();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            loop {
                match lines.recv().await {
                    Ok(line) => {
                        let category = match line.level {
                            OutputLevel::Log => OutputCategory::Stdout,
                            OutputLevel::Error => OutputCategory::Stderr,
                        };
                        if events.send(Event::output(category, &line.text)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "client output lagging, lines dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        let previous = self
            .output_forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Close the connection and kill the CLI.
    async fn release(&self) {
        let connection = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = connection {
            connection.close().await;
        }
        if let Some(mut project) = self.project.lock().await.take() {
            project.terminate();
        }
        let forwarder = self
            .output_forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.forget_handles();
    }

    async fn disconnect(&self) -> Result<Option<Value>, AdapterError> {
        self.closing.send_replace(true);
        self.release().await;
        self.closing.send_replace(false);
        self.send_event(Event::terminated());
        Ok(None)
    }

    fn connection(&self) -> Result<Arc<dyn DebugConnection>, AdapterError> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| connection_failed(ConnectionError::NotAttached))
    }

    fn send_event(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::debug!("event dropped, session gone");
        }
    }

    async fn set_breakpoints(&self, arguments: Value) -> Result<Option<Value>, AdapterError> {
        let args: SetBreakpointsArguments = parse_arguments("setBreakpoints", arguments)?;
        let url = args
            .source
            .path
            .clone()
            .ok_or_else(|| AdapterError::failed("setBreakpoints: source has no path"))?;
        let connection = self.connection()?;

        let stale = self
            .breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&url)
            .unwrap_or_default();
        for id in stale {
            if let Err(e) = connection.remove_breakpoint(&id).await {
                tracing::debug!(breakpoint = %id, "remove failed: {}", e);
            }
        }

        let mut ids = Vec::new();
        let mut reported = Vec::with_capacity(args.breakpoints.len());
        for requested in &args.breakpoints {
            let column = requested.column.unwrap_or(0);
            let breakpoint = match connection
                .set_breakpoint_by_url(&url, requested.line, column)
                .await
            {
                Ok(result) => {
                    let id = result["breakpointId"].as_str().map(str::to_string);
                    ids.extend(id.clone());
                    Breakpoint {
                        id,
                        verified: true,
                        message: None,
                        source: Some(args.source.clone()),
                        line: Some(requested.line),
                    }
                }
                Err(e) => Breakpoint {
                    id: None,
                    verified: false,
                    message: Some(e.to_string()),
                    source: Some(args.source.clone()),
                    line: Some(requested.line),
                },
            };
            reported.push(breakpoint);
        }
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url, ids);

        Ok(Some(json!({ "breakpoints": reported })))
    }

    async fn set_exception_breakpoints(&self, arguments: Value) -> Result<Option<Value>, AdapterError> {
        let filters: Vec<String> = arguments
            .get("filters")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AdapterError::failed(format!("invalid setExceptionBreakpoints arguments: {e}")))?
            .unwrap_or_default();
        let state = if filters.iter().any(|f| f == "all") {
            "all"
        } else if filters.iter().any(|f| f == "uncaught") {
            "uncaught"
        } else {
            "none"
        };
        self.connection()?
            .set_pause_on_exceptions(state)
            .await
            .map_err(connection_failed)?;
        Ok(None)
    }

    async fn evaluate(&self, arguments: Value) -> Result<Option<Value>, AdapterError> {
        let args: EvaluateArguments = parse_arguments("evaluate", arguments)?;
        let connection = self.connection()?;
        let result = match &args.frame_id {
            Some(frame) => {
                let frame = frame
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.to_string());
                connection
                    .evaluate_on_call_frame(&frame, &args.expression)
                    .await
            }
            None => connection.evaluate(&args.expression).await,
        }
        .map_err(connection_failed)?;

        let text = describe(&result["result"]);
        if result["wasThrown"].as_bool().unwrap_or(false) {
            return Err(AdapterError::failed(text));
        }
        let reference = self.reference_for(&result["result"]);
        Ok(Some(json!({ "result": text, "variablesReference": reference })))
    }

    async fn variables(&self, arguments: Value) -> Result<Option<Value>, AdapterError> {
        let reference = arguments["variablesReference"].as_i64().unwrap_or(0);
        let Some(object_id) = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
        else {
            return Ok(Some(json!({ "variables": [] })));
        };
        let result = self
            .connection()?
            .get_properties(&object_id, true)
            .await
            .map_err(connection_failed)?;

        let properties = result["result"].as_array().cloned().unwrap_or_default();
        let variables: Vec<Value> = properties
            .iter()
            .map(|property| {
                json!({
                    "name": property["name"].as_str().unwrap_or_default(),
                    "value": describe(&property["value"]),
                    "variablesReference": self.reference_for(&property["value"]),
                })
            })
            .collect();
        Ok(Some(json!({ "variables": variables })))
    }

    async fn source(&self, arguments: Value) -> Result<Option<Value>, AdapterError> {
        let script = arguments["source"]["path"]
            .as_str()
            .map(str::to_string)
            .or_else(|| arguments["sourceReference"].as_i64().map(|r| r.to_string()))
            .ok_or_else(|| AdapterError::failed("source: no path or sourceReference"))?;
        let result = self
            .connection()?
            .get_script_source(&script)
            .await
            .map_err(connection_failed)?;
        Ok(Some(json!({ "content": result["scriptSource"].as_str().unwrap_or_default() })))
    }

    /// The connection, for a command that lets the target run again.
    fn resuming(&self) -> Result<Arc<dyn DebugConnection>, AdapterError> {
        let connection = self.connection()?;
        self.forget_handles();
        Ok(connection)
    }

    /// References handed out while paused go stale once the target runs.
    fn forget_handles(&self) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn reference_for(&self, remote: &Value) -> i64 {
        match remote["objectId"].as_str() {
            Some(object_id) => self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .create(object_id),
            None => 0,
        }
    }
}

#[async_trait]
impl BackendAdapter for NsDebugAdapter {
    async fn dispatch(&self, command: &str, arguments: Value) -> Result<Option<Value>, AdapterError> {
        match command {
            "initialize" => Ok(Some(self.initialize())),
            "launch" | "attach" => self.launch(command, arguments).await,
            "configurationDone" => Ok(None),
            "disconnect" => self.disconnect().await,
            "setBreakpoints" => self.set_breakpoints(arguments).await,
            "setExceptionBreakpoints" => self.set_exception_breakpoints(arguments).await,
            "continue" => {
                self.resuming()?.resume().await.map_err(connection_failed)?;
                Ok(Some(json!({ "allThreadsContinued": true })))
            }
            "next" => step(self.resuming()?.step_over().await),
            "stepIn" => step(self.resuming()?.step_in().await),
            "stepOut" => step(self.resuming()?.step_out().await),
            "pause" => step(self.connection()?.pause().await),
            "threads" => Ok(Some(json!({
                "threads": [{ "id": MAIN_THREAD_ID, "name": "Thread 1" }]
            }))),
            "stackTrace" => Ok(Some(json!({ "stackFrames": [], "totalFrames": 0 }))),
            "scopes" => Ok(Some(json!({ "scopes": [] }))),
            "variables" => self.variables(arguments).await,
            "evaluate" => self.evaluate(arguments).await,
            "source" => self.source(arguments).await,
            _ => Err(AdapterError::UnknownCommand(command.to_string())),
        }
    }

    async fn shutdown(&self) {
        self.closing.send_replace(true);
        self.release().await;
    }
}

/// Spawn and wait for the CLI, then attach to the discovered port.
async fn start(
    project: &mut Project,
    args: &LaunchArgs,
) -> Result<Arc<dyn DebugConnection>, LaunchError> {
    project.debug(args).await?;
    let port = project.debug_port().await?;
    let connection: Arc<dyn DebugConnection> = Arc::from(project.create_connection());
    connection.attach(DEBUG_HOST, port).await?;
    tracing::info!(platform = %project.platform(), port, "debugger attached");
    Ok(connection)
}

fn step(result: Result<Value, ConnectionError>) -> Result<Option<Value>, AdapterError> {
    result.map(|_| None).map_err(connection_failed)
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    command: &str,
    arguments: Value,
) -> Result<T, AdapterError> {
    serde_json::from_value(arguments)
        .map_err(|e| AdapterError::failed(format!("invalid {command} arguments: {e}")))
}

fn launch_failed(err: LaunchError) -> AdapterError {
    AdapterError::failed(err.to_string())
}

fn connection_failed(err: ConnectionError) -> AdapterError {
    AdapterError::failed(err.to_string())
}

/// Display text of a remote object.
fn describe(remote: &Value) -> String {
    if let Some(description) = remote["description"].as_str() {
        return description.to_string();
    }
    match &remote["value"] {
        Value::String(text) => format!("\"{text}\""),
        Value::Null => remote["type"].as_str().unwrap_or("undefined").to_string(),
        other => other.to_string(),
    }
}

/// Maps client `variablesReference` numbers to remote object ids.
///
/// An object seen again gets its existing reference back. References are
/// only valid while the target stays paused.
#[derive(Default)]
struct VariableHandles {
    objects: Vec<String>,
    references: HashMap<String, i64>,
}

impl VariableHandles {
    /// References start at 1; 0 means "no children".
    fn create(&mut self, object_id: &str) -> i64 {
        if let Some(&reference) = self.references.get(object_id) {
            return reference;
        }
        self.objects.push(object_id.to_string());
        let reference = self.objects.len() as i64;
        self.references.insert(object_id.to_string(), reference);
        reference
    }

    fn get(&self, reference: i64) -> Option<String> {
        let index = usize::try_from(reference).ok()?.checked_sub(1)?;
        self.objects.get(index).cloned()
    }

    fn clear(&mut self) {
        self.objects.clear();
        self.references.clear();
    }
}
