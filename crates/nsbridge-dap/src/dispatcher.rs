//! Request dispatch and error translation.
//!
//! Every request yields exactly one [`Response`] carrying the request's
//! `seq`. Failures are classified, in priority order:
//!
//! 1. the backend does not know the command → [`UNRECOGNIZED_COMMAND`]
//! 2. an `evaluate` failed → raw error text, no tag
//! 3. any other backend failure → tagged with [`ADAPTER_TAG`]
//! 4. the pipeline rejected the request, or a stage or the backend
//!    panicked →
//!    [`DISPATCH_EXCEPTION`]

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AdapterError, TransformError};
use crate::pipeline::TransformPipeline;
use crate::protocol::{ErrorDestination, ErrorMessage, Request, Response};

/// Error code for a command the backend does not handle.
pub const UNRECOGNIZED_COMMAND: i64 = 1014;

/// Error code for an exception raised while dispatching.
pub const DISPATCH_EXCEPTION: i64 = 1104;

/// Prefix marking messages that come from this adapter.
pub const ADAPTER_TAG: &str = "[NSDebugAdapter] ";

/// The backend that actually executes client commands.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Run `command`. `Ok(None)` means success with no body.
    async fn dispatch(&self, command: &str, arguments: Value) -> Result<Option<Value>, AdapterError>;

    /// The client went away; release whatever the adapter holds.
    async fn shutdown(&self) {}
}

/// Routes requests through the pipeline to a [`BackendAdapter`].
///
/// Holds no lock across adapter calls; concurrent dispatches run
/// concurrently if the adapter allows it.
pub struct RequestDispatcher {
    pipeline: Arc<TransformPipeline>,
    adapter: Arc<dyn BackendAdapter>,
}

impl RequestDispatcher {
    pub fn new(pipeline: TransformPipeline, adapter: Arc<dyn BackendAdapter>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            adapter,
        }
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    pub async fn shutdown(&self) {
        self.adapter.shutdown().await;
    }

    pub async fn dispatch(&self, request: &Request) -> Response {
        // Both rewrites and the adapter call run on their own task, so a
        // panic anywhere in them surfaces as a JoinError instead of taking
        // the request down with no response.
        let pipeline = Arc::clone(&self.pipeline);
        let adapter = Arc::clone(&self.adapter);
        let command = request.command.clone();
        let mut args = request.arguments.clone().unwrap_or(Value::Null);
        let outcome = tokio::spawn(async move {
            if let Err(e) = pipeline.transform_request(&command, &mut args) {
                return Outcome::Rejected(e);
            }
            match adapter.dispatch(&command, args).await {
                Ok(mut body) => {
                    if let Some(body) = body.as_mut() {
                        pipeline.transform_response(&command, body);
                    }
                    Outcome::Done(body)
                }
                Err(err) => Outcome::Failed(err),
            }
        })
        .await;

        match outcome {
            Ok(Outcome::Done(body)) => Response::success(request, body),
            Ok(Outcome::Failed(err)) => failure_response(request, &err),
            Ok(Outcome::Rejected(err)) => exception_response(request, &err.to_string()),
            Err(join) if join.is_panic() => {
                exception_response(request, &panic_message(join.into_panic()))
            }
            Err(join) => exception_response(request, &join.to_string()),
        }
    }
}

/// What the dispatch task produced.
enum Outcome {
    Done(Option<Value>),
    Failed(AdapterError),
    Rejected(TransformError),
}

fn failure_response(request: &Request, err: &AdapterError) -> Response {
    if err.is_unknown_command() {
        let error = ErrorMessage::new(
            UNRECOGNIZED_COMMAND,
            format!("{ADAPTER_TAG}Unrecognized request: {}", request.command),
            ErrorDestination::Telemetry,
        );
        tracing::warn!(command = %request.command, "unrecognized request");
        return Response::error(request, error);
    }

    let text = err.to_string();
    if request.command == "evaluate" {
        // Failed evaluations are routine (undefined names in watches) and
        // go back to the client untagged.
        tracing::debug!("evaluate failed: {}", text);
        return Response::failure(request, text);
    }

    tracing::error!(frontend_message = true, "Error: {}", text);
    Response::failure(request, format!("{ADAPTER_TAG}{text}"))
}

fn exception_response(request: &Request, text: &str) -> Response {
    tracing::error!(
        command = %request.command,
        "exception while processing {}: {}",
        request.command,
        text
    );
    let error = ErrorMessage::new(
        DISPATCH_EXCEPTION,
        "Exception while processing request (exception: {_exception})",
        ErrorDestination::Telemetry,
    )
    .with_variable("_exception", text)
    .with_variable("command", request.command.as_str());
    Response::error(request, error)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Transformer;
    use serde_json::json;
    use std::time::Duration;

    /// Adapter scripted per command name.
    struct ScriptedAdapter;

    #[async_trait]
    impl BackendAdapter for ScriptedAdapter {
        async fn dispatch(
            &self,
            command: &str,
            arguments: Value,
        ) -> Result<Option<Value>, AdapterError> {
            match command {
                "threads" => Ok(Some(json!({"threads": [{"id": 1, "name": "main"}]}))),
                "configurationDone" => Ok(None),
                "stackTrace" => Ok(Some(json!({
                    "stackFrames": [{"id": 1, "name": "onTap", "line": 0, "column": 0}]
                }))),
                "echo" => Ok(Some(arguments)),
                "restartFrame" => Err(AdapterError::UnknownCommand(command.into())),
                "goto" => Err(AdapterError::failed("Error: unknowncommand")),
                "evaluate" => Err(AdapterError::failed("ReferenceError: foo is not defined")),
                "pause" => Err(AdapterError::failed("not attached")),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Some(json!({"slow": true})))
                }
                "crash" => panic!("adapter blew up"),
                _ => Ok(None),
            }
        }
    }

    fn dispatcher(pipeline: TransformPipeline) -> RequestDispatcher {
        RequestDispatcher::new(pipeline, Arc::new(ScriptedAdapter))
    }

    #[tokio::test]
    async fn success_carries_body_and_seq() {
        let resp = dispatcher(TransformPipeline::new())
            .dispatch(&Request::new(4, "threads", None))
            .await;
        assert!(resp.success);
        assert_eq!(resp.request_seq, 4);
        assert_eq!(resp.command, "threads");
        assert_eq!(resp.body.unwrap()["threads"][0]["name"], "main");
    }

    #[tokio::test]
    async fn success_without_body() {
        let resp = dispatcher(TransformPipeline::new())
            .dispatch(&Request::new(5, "configurationDone", None))
            .await;
        assert!(resp.success);
        assert!(resp.body.is_none());
        assert!(resp.message.is_none());
    }

    #[tokio::test]
    async fn unknown_command_maps_to_1014() {
        let d = dispatcher(TransformPipeline::new());
        for command in ["restartFrame", "goto"] {
            let resp = d.dispatch(&Request::new(6, command, None)).await;
            assert!(!resp.success);
            assert_eq!(resp.request_seq, 6);
            assert_eq!(resp.error_id(), Some(UNRECOGNIZED_COMMAND));
            assert_eq!(
                resp.message.as_deref(),
                Some(format!("[NSDebugAdapter] Unrecognized request: {command}").as_str())
            );
            assert_eq!(resp.body.unwrap()["error"]["sendTelemetry"], true);
        }
    }

    #[tokio::test]
    async fn evaluate_failure_is_passed_through_raw() {
        let resp = dispatcher(TransformPipeline::new())
            .dispatch(&Request::new(7, "evaluate", Some(json!({"expression": "foo"}))))
            .await;
        assert!(!resp.success);
        assert_eq!(
            resp.message.as_deref(),
            Some("ReferenceError: foo is not defined")
        );
        assert!(resp.error_id().is_none());
    }

    #[tokio::test]
    async fn other_failures_are_tagged() {
        let resp = dispatcher(TransformPipeline::new())
            .dispatch(&Request::new(8, "pause", None))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.message.as_deref(), Some("[NSDebugAdapter] not attached"));
    }

    #[tokio::test]
    async fn adapter_panic_maps_to_1104() {
        let resp = dispatcher(TransformPipeline::new())
            .dispatch(&Request::new(9, "crash", None))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.request_seq, 9);
        assert_eq!(resp.error_id(), Some(DISPATCH_EXCEPTION));
        assert_eq!(
            resp.message.as_deref(),
            Some("Exception while processing request (exception: adapter blew up)")
        );
        assert_eq!(resp.body.unwrap()["error"]["variables"]["command"], "crash");
    }

    struct Rejecting;

    impl Transformer for Rejecting {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        fn transform_request(&self, _: &str, _: &mut Value) -> Result<(), TransformError> {
            Err(TransformError::new("rejecting", "bad arguments"))
        }
    }

    #[tokio::test]
    async fn pipeline_failure_maps_to_1104_with_command() {
        let resp = dispatcher(TransformPipeline::new().with_stage(Rejecting))
            .dispatch(&Request::new(10, "setBreakpoints", Some(json!({}))))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.command, "setBreakpoints");
        assert_eq!(resp.error_id(), Some(DISPATCH_EXCEPTION));
        assert!(resp.message.unwrap().contains("rejecting: bad arguments"));
    }

    struct Exploding;

    impl Transformer for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn transform_request(&self, command: &str, _: &mut Value) -> Result<(), TransformError> {
            if command == "next" {
                panic!("stage blew up");
            }
            Ok(())
        }

        fn transform_response(&self, command: &str, _: &mut Value) {
            if command == "threads" {
                panic!("stage blew up on the way back");
            }
        }
    }

    #[tokio::test]
    async fn stage_panic_on_request_maps_to_1104() {
        let resp = dispatcher(TransformPipeline::new().with_stage(Exploding))
            .dispatch(&Request::new(7, "next", Some(json!({"threadId": 1}))))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.request_seq, 7);
        assert_eq!(resp.command, "next");
        assert_eq!(resp.error_id(), Some(DISPATCH_EXCEPTION));
        assert_eq!(
            resp.message.as_deref(),
            Some("Exception while processing request (exception: stage blew up)")
        );
    }

    #[tokio::test]
    async fn stage_panic_on_response_maps_to_1104() {
        let resp = dispatcher(TransformPipeline::new().with_stage(Exploding))
            .dispatch(&Request::new(8, "threads", None))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.request_seq, 8);
        assert_eq!(resp.error_id(), Some(DISPATCH_EXCEPTION));
    }

    #[tokio::test]
    async fn line_overflow_is_rejected_not_panicked() {
        let pipeline = TransformPipeline::standard(false, Default::default(), "file:///app/");
        let resp = dispatcher(pipeline)
            .dispatch(&Request::new(
                13,
                "setBreakpoints",
                Some(json!({"breakpoints": [{"line": i64::MIN}]})),
            ))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.request_seq, 13);
        assert_eq!(resp.error_id(), Some(DISPATCH_EXCEPTION));
        assert!(resp.message.unwrap().contains("line out of range"));
    }

    #[tokio::test]
    async fn response_body_goes_through_pipeline() {
        let pipeline = TransformPipeline::standard(false, Default::default(), "file:///app/");
        let resp = dispatcher(pipeline)
            .dispatch(&Request::new(11, "stackTrace", Some(json!({"threadId": 1}))))
            .await;
        assert!(resp.success);
        // Target line 0 is client line 1.
        assert_eq!(resp.body.unwrap()["stackFrames"][0]["line"], 1);
    }

    #[tokio::test]
    async fn request_arguments_reach_adapter() {
        let resp = dispatcher(TransformPipeline::new())
            .dispatch(&Request::new(12, "echo", Some(json!({"line": 3}))))
            .await;
        assert_eq!(resp.body.unwrap()["line"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_overlap() {
        let d = Arc::new(dispatcher(TransformPipeline::new()));
        let slow = {
            let d = Arc::clone(&d);
            tokio::spawn(async move { d.dispatch(&Request::new(1, "slow", None)).await })
        };
        tokio::task::yield_now().await;

        // Answered while `slow` is still sleeping.
        let fast = d.dispatch(&Request::new(2, "threads", None)).await;
        assert!(fast.success);
        assert!(!slow.is_finished());

        let slow = slow.await.unwrap();
        assert_eq!(slow.request_seq, 1);
        assert!(slow.success);
    }
}
