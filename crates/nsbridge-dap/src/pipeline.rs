//! Request/response rewriting between the client and the backend.
//!
//! Requests pass through the stages in order; responses and events pass
//! through them in reverse, so each stage undoes its own rewrite on the
//! way back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use crate::error::TransformError;
use crate::protocol::Event;

/// One stage of the pipeline.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform_request(&self, _command: &str, _args: &mut Value) -> Result<(), TransformError> {
        Ok(())
    }

    fn transform_response(&self, _command: &str, _body: &mut Value) {}

    fn transform_event(&self, _event: &mut Event) {}
}

/// Ordered chain of [`Transformer`]s.
#[derive(Default)]
pub struct TransformPipeline {
    stages: Vec<Box<dyn Transformer>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl Transformer + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Line numbers, then source maps, then device paths.
    pub fn standard(
        target_lines_start_at1: bool,
        source_maps: SourceMapTransformer,
        remote_root: impl Into<String>,
    ) -> Self {
        Self::new()
            .with_stage(LineNumberTransformer::new(target_lines_start_at1))
            .with_stage(source_maps)
            .with_stage(PathTransformer::new(remote_root))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn transform_request(&self, command: &str, args: &mut Value) -> Result<(), TransformError> {
        for stage in &self.stages {
            stage.transform_request(command, args)?;
        }
        Ok(())
    }

    pub fn transform_response(&self, command: &str, body: &mut Value) {
        for stage in self.stages.iter().rev() {
            stage.transform_response(command, body);
        }
    }

    pub fn transform_event(&self, event: &mut Event) {
        for stage in self.stages.iter().rev() {
            stage.transform_event(event);
        }
    }
}

fn for_each_in_array(value: &mut Value, key: &str, mut f: impl FnMut(&mut Value)) {
    if let Some(items) = value.get_mut(key).and_then(Value::as_array_mut) {
        items.iter_mut().for_each(&mut f);
    }
}

fn for_each_source_path(value: &mut Value, mut f: impl FnMut(&str) -> Option<String>) {
    if let Some(path) = value.pointer_mut("/source/path") {
        if let Some(mapped) = path.as_str().and_then(&mut f) {
            *path = Value::String(mapped);
        }
    }
}

/// Rewrites every source path a response, event or `setBreakpoints`
/// request carries.
fn map_paths(command: &str, value: &mut Value, f: &dyn Fn(&str) -> Option<String>) {
    match command {
        "setBreakpoints" => {
            for_each_source_path(value, f);
            for_each_in_array(value, "breakpoints", |bp| for_each_source_path(bp, f));
        }
        "stackTrace" => for_each_in_array(value, "stackFrames", |frame| for_each_source_path(frame, f)),
        "breakpoint" => {
            if let Some(bp) = value.get_mut("breakpoint") {
                for_each_source_path(bp, f);
            }
        }
        "loadedSource" | "stopped" => for_each_source_path(value, f),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Line numbers
// ---------------------------------------------------------------------------

/// Converts between the client's and the target's line numbering.
pub struct LineNumberTransformer {
    target_lines_start_at1: bool,
    client_lines_start_at1: AtomicBool,
}

impl LineNumberTransformer {
    pub fn new(target_lines_start_at1: bool) -> Self {
        Self {
            target_lines_start_at1,
            // DAP default until `initialize` says otherwise.
            client_lines_start_at1: AtomicBool::new(true),
        }
    }

    /// Offset added to a client line to get a target line.
    fn offset(&self) -> i64 {
        let client = i64::from(self.client_lines_start_at1.load(Ordering::Relaxed));
        let target = i64::from(self.target_lines_start_at1);
        target - client
    }

    fn shift_line(value: &mut Value, delta: i64) -> Result<(), &'static str> {
        if let Some(line) = value.get_mut("line") {
            let n = line.as_i64().ok_or("line must be an integer")?;
            *line = Value::from(n.checked_add(delta).ok_or("line out of range")?);
        }
        Ok(())
    }
}

impl Transformer for LineNumberTransformer {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn transform_request(&self, command: &str, args: &mut Value) -> Result<(), TransformError> {
        match command {
            "initialize" => {
                let client_one_based = args
                    .get("linesStartAt1")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                self.client_lines_start_at1
                    .store(client_one_based, Ordering::Relaxed);
            }
            "setBreakpoints" => {
                let delta = self.offset();
                if let Some(bps) = args.get_mut("breakpoints").and_then(Value::as_array_mut) {
                    for bp in bps {
                        Self::shift_line(bp, delta)
                            .map_err(|e| TransformError::new(self.name(), e))?;
                    }
                }
                if let Some(lines) = args.get_mut("lines").and_then(Value::as_array_mut) {
                    for line in lines {
                        let n = line
                            .as_i64()
                            .ok_or_else(|| TransformError::new(self.name(), "line must be an integer"))?;
                        let shifted = n
                            .checked_add(delta)
                            .ok_or_else(|| TransformError::new(self.name(), "line out of range"))?;
                        *line = Value::from(shifted);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn transform_response(&self, command: &str, body: &mut Value) {
        let delta = -self.offset();
        let key = match command {
            "setBreakpoints" => "breakpoints",
            "stackTrace" => "stackFrames",
            _ => return,
        };
        for_each_in_array(body, key, |item| {
            // Responses come from the backend; a malformed line is left as is.
            let _ = Self::shift_line(item, delta);
        });
    }

    fn transform_event(&self, event: &mut Event) {
        if event.event != "breakpoint" {
            return;
        }
        let delta = -self.offset();
        if let Some(bp) = event.body.as_mut().and_then(|b| b.get_mut("breakpoint")) {
            let _ = Self::shift_line(bp, delta);
        }
    }
}

// ---------------------------------------------------------------------------
// Source maps
// ---------------------------------------------------------------------------

/// Maps authored sources to the generated files the target runs.
#[derive(Default)]
pub struct SourceMapTransformer {
    authored_to_generated: RwLock<HashMap<String, String>>,
}

impl SourceMapTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, authored: impl Into<String>, generated: impl Into<String>) {
        self.authored_to_generated
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(authored.into(), generated.into());
    }

    pub fn generated_for(&self, authored: &str) -> Option<String> {
        self.authored_to_generated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(authored)
            .cloned()
    }

    pub fn authored_for(&self, generated: &str) -> Option<String> {
        self.authored_to_generated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, g)| g.as_str() == generated)
            .map(|(a, _)| a.clone())
    }
}

impl Transformer for SourceMapTransformer {
    fn name(&self) -> &'static str {
        "sourcemaps"
    }

    fn transform_request(&self, command: &str, args: &mut Value) -> Result<(), TransformError> {
        if command == "setBreakpoints" {
            for_each_source_path(args, |path| self.generated_for(path));
        }
        Ok(())
    }

    fn transform_response(&self, command: &str, body: &mut Value) {
        map_paths(command, body, &|path: &str| self.authored_for(path));
    }

    fn transform_event(&self, event: &mut Event) {
        let name = event.event.clone();
        if let Some(body) = event.body.as_mut() {
            map_paths(&name, body, &|path: &str| self.authored_for(path));
        }
    }
}

// ---------------------------------------------------------------------------
// Device paths
// ---------------------------------------------------------------------------

/// Maps local paths under the app root to the URLs the target uses.
///
/// The app root is taken from the `appRoot` argument of `launch` or
/// `attach`; until then paths pass through unchanged.
pub struct PathTransformer {
    remote_root: String,
    app_root: RwLock<Option<PathBuf>>,
}

impl PathTransformer {
    pub fn new(remote_root: impl Into<String>) -> Self {
        let mut remote_root = remote_root.into();
        if !remote_root.ends_with('/') {
            remote_root.push('/');
        }
        Self {
            remote_root,
            app_root: RwLock::new(None),
        }
    }

    fn app_root(&self) -> Option<PathBuf> {
        self.app_root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_app_root(&self, root: impl Into<PathBuf>) {
        *self.app_root.write().unwrap_or_else(PoisonError::into_inner) = Some(root.into());
    }

    /// `<app_root>/a/b.js` → `<remote_root>a/b.js`
    pub fn to_remote(&self, local: &str) -> Option<String> {
        let root = self.app_root()?;
        let relative = Path::new(local).strip_prefix(&root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(format!("{}{}", self.remote_root, parts.join("/")))
    }

    /// `<remote_root>a/b.js` → `<app_root>/a/b.js`
    pub fn to_local(&self, remote: &str) -> Option<String> {
        let root = self.app_root()?;
        let relative = remote.strip_prefix(&self.remote_root)?;
        let local = relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(root, |path, part| path.join(part));
        Some(local.to_string_lossy().into_owned())
    }
}

impl Transformer for PathTransformer {
    fn name(&self) -> &'static str {
        "paths"
    }

    fn transform_request(&self, command: &str, args: &mut Value) -> Result<(), TransformError> {
        match command {
            "launch" | "attach" => {
                let root = args
                    .get("appRoot")
                    .and_then(Value::as_str)
                    .ok_or_else(|| TransformError::new(self.name(), "missing appRoot"))?;
                self.set_app_root(root);
            }
            "setBreakpoints" => for_each_source_path(args, |path| self.to_remote(path)),
            _ => {}
        }
        Ok(())
    }

    fn transform_response(&self, command: &str, body: &mut Value) {
        map_paths(command, body, &|path: &str| self.to_local(path));
    }

    fn transform_event(&self, event: &mut Event) {
        let name = event.event.clone();
        if let Some(body) = event.body.as_mut() {
            map_paths(&name, body, &|path: &str| self.to_local(path));
        }
    }
}
