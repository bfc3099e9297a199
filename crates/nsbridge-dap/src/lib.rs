//! nsbridge-dap: the client-facing side of the debug adapter.
//!
//! Protocol types and framing, the request transform pipeline, request
//! dispatch with error classification, and the session that ties them to
//! the client stream.

pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod transport;

pub use dispatcher::{
    BackendAdapter, RequestDispatcher, ADAPTER_TAG, DISPATCH_EXCEPTION, UNRECOGNIZED_COMMAND,
};
pub use error::{AdapterError, DapError, TransformError, UNKNOWN_COMMAND_TEXT};
pub use pipeline::{
    LineNumberTransformer, PathTransformer, SourceMapTransformer, TransformPipeline, Transformer,
};
pub use protocol::*;
pub use session::{DebugSession, EventSender, Outbound};
pub use transport::{encode_message, read_message, write_message, MAX_MESSAGE_SIZE};
