//! End-to-end session tests over in-memory pipes with a scripted backend.

use std::sync::Arc;

use async_trait::async_trait;
use nsbridge::server::run_session;
use nsbridge::settings::transform_pipeline;
use nsbridge_config::Config;
use nsbridge_dap::{
    read_message, write_message, AdapterError, BackendAdapter, Event, EventSender,
    OutputCategory,
};
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

struct ScriptedBackend {
    events: EventSender,
}

#[async_trait]
impl BackendAdapter for ScriptedBackend {
    async fn dispatch(&self, command: &str, arguments: Value) -> Result<Option<Value>, AdapterError> {
        match command {
            "initialize" => Ok(Some(json!({ "supportsConfigurationDoneRequest": true }))),
            "launch" => {
                let _ = self
                    .events
                    .send(Event::output(OutputCategory::Stdout, "JS: app started"));
                let _ = self.events.send(Event::initialized());
                Ok(None)
            }
            "setBreakpoints" => Ok(Some(json!({
                "breakpoints": [{
                    "verified": true,
                    "line": arguments["breakpoints"][0]["line"],
                    "source": arguments["source"],
                }],
                "seen": arguments,
            }))),
            "evaluate" => Err(AdapterError::failed("ReferenceError: x is not defined")),
            "pause" => Err(AdapterError::failed("debug connection is not attached")),
            _ => Err(AdapterError::UnknownCommand(command.to_string())),
        }
    }
}

struct Client {
    to_server: DuplexStream,
    from_server: BufReader<DuplexStream>,
    next_seq: i64,
    last_server_seq: i64,
    session: JoinHandle<anyhow::Result<()>>,
}

impl Client {
    fn start() -> Self {
        let (to_server, server_in) = duplex(64 * 1024);
        let (server_out, from_server) = duplex(64 * 1024);
        let session = tokio::spawn(run_session(
            server_in,
            server_out,
            transform_pipeline(&Config::default()),
            |events| Arc::new(ScriptedBackend { events }) as Arc<dyn BackendAdapter>,
        ));
        Self {
            to_server,
            from_server: BufReader::new(from_server),
            next_seq: 1,
            last_server_seq: 0,
            session,
        }
    }

    async fn send(&mut self, command: &str, arguments: Value) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let request = json!({ "seq": seq, "type": "request", "command": command, "arguments": arguments });
        write_message(&mut self.to_server, &request).await.unwrap();
        seq
    }

    async fn recv(&mut self) -> Value {
        let message = read_message(&mut self.from_server)
            .await
            .unwrap()
            .expect("server closed the stream");
        let seq = message["seq"].as_i64().unwrap();
        assert!(seq > self.last_server_seq, "seq went from {} to {seq}", self.last_server_seq);
        self.last_server_seq = seq;
        message
    }

    /// Messages up to and including the response to `request_seq`.
    async fn until_response(&mut self, request_seq: i64) -> (Value, Vec<Value>) {
        let mut others = Vec::new();
        loop {
            let message = self.recv().await;
            if message["type"] == "response" && message["request_seq"] == request_seq {
                return (message, others);
            }
            others.push(message);
        }
    }

    async fn request(&mut self, command: &str, arguments: Value) -> Value {
        let seq = self.send(command, arguments).await;
        self.until_response(seq).await.0
    }
}

#[tokio::test]
async fn initialize_then_launch_emits_events() {
    let mut client = Client::start();

    let init = client
        .request("initialize", json!({ "adapterID": "nativescript", "linesStartAt1": true }))
        .await;
    assert_eq!(init["success"], true);
    assert_eq!(init["command"], "initialize");
    assert_eq!(init["body"]["supportsConfigurationDoneRequest"], true);

    let seq = client
        .send("launch", json!({ "platform": "android", "appRoot": "/work/app" }))
        .await;
    let (launch, mut events) = client.until_response(seq).await;
    assert_eq!(launch["success"], true);

    while !events.iter().any(|e| e["event"] == "initialized") {
        events.push(client.recv().await);
    }
    assert!(events
        .iter()
        .any(|e| e["event"] == "output" && e["body"]["output"] == "JS: app started\n"));
}

#[tokio::test]
async fn breakpoints_are_rewritten_both_ways() {
    let mut client = Client::start();
    client.request("initialize", json!({ "linesStartAt1": true })).await;
    let seq = client
        .send("launch", json!({ "platform": "android", "appRoot": "/work/app" }))
        .await;
    client.until_response(seq).await;

    let resp = client
        .request(
            "setBreakpoints",
            json!({
                "source": { "path": "/work/app/app/main.js" },
                "breakpoints": [{ "line": 10 }]
            }),
        )
        .await;
    assert_eq!(resp["success"], true);

    let body = &resp["body"];
    // What the backend saw: zero-based lines, device urls.
    assert_eq!(body["seen"]["breakpoints"][0]["line"], 9);
    assert_eq!(body["seen"]["source"]["path"], "file:///app/app/main.js");
    // What the client gets back.
    assert_eq!(body["breakpoints"][0]["line"], 10);
    assert_eq!(body["breakpoints"][0]["source"]["path"], "/work/app/app/main.js");
}

#[tokio::test]
async fn failures_are_classified() {
    let mut client = Client::start();

    let unknown = client.request("restartFrame", json!({})).await;
    assert_eq!(unknown["success"], false);
    assert_eq!(unknown["body"]["error"]["id"], 1014);
    assert_eq!(
        unknown["message"],
        "[NSDebugAdapter] Unrecognized request: restartFrame"
    );

    let evaluate = client.request("evaluate", json!({ "expression": "x" })).await;
    assert_eq!(evaluate["message"], "ReferenceError: x is not defined");

    let pause = client.request("pause", json!({ "threadId": 1 })).await;
    assert_eq!(
        pause["message"],
        "[NSDebugAdapter] debug connection is not attached"
    );

    let launch = client.request("launch", json!({ "platform": "android" })).await;
    assert_eq!(launch["success"], false);
    assert_eq!(launch["body"]["error"]["id"], 1104);
    assert_eq!(launch["body"]["error"]["variables"]["command"], "launch");
}

#[tokio::test]
async fn out_of_range_line_still_gets_a_response() {
    let mut client = Client::start();
    client.request("initialize", json!({ "linesStartAt1": true })).await;

    let resp = client
        .request(
            "setBreakpoints",
            json!({ "source": { "path": "/work/app/app/main.js" }, "breakpoints": [{ "line": i64::MIN }] }),
        )
        .await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["request_seq"], 2);
    assert_eq!(resp["body"]["error"]["id"], 1104);

    // The session keeps serving.
    let resp = client.request("initialize", json!({})).await;
    assert_eq!(resp["success"], true);
}

#[tokio::test]
async fn oversized_frame_ends_session_without_panicking() {
    let mut client = Client::start();
    client.request("initialize", json!({})).await;
    client
        .to_server
        .write_all(b"Content-Length: 18446744073709551615\r\n\r\n{}")
        .await
        .unwrap();

    let err = client.session.await.unwrap().unwrap_err();
    assert!(format!("{err:#}").contains("message too large"), "got: {err:#}");
}

#[tokio::test]
async fn malformed_frame_is_skipped() {
    let mut client = Client::start();
    client
        .to_server
        .write_all(b"Content-Length: 5\r\n\r\n{oops")
        .await
        .unwrap();

    let resp = client.request("initialize", json!({})).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["request_seq"], 1);
}

#[tokio::test]
async fn client_eof_ends_session() {
    let mut client = Client::start();
    client.request("initialize", json!({})).await;

    let Client {
        to_server,
        mut from_server,
        session,
        ..
    } = client;
    drop(to_server);

    session.await.unwrap().unwrap();
    assert!(read_message(&mut from_server).await.unwrap().is_none());
}
