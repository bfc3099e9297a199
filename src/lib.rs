//! nsbridge: debug adapter bridging a DAP client to NativeScript apps.
//!
//! The binary wires configuration, logging and the client transport to the
//! [`adapter::NsDebugAdapter`] backend.

pub mod adapter;
pub mod logging;
pub mod server;
pub mod settings;
