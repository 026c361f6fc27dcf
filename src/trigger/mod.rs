// src/trigger/mod.rs

//! Remote trigger protocol: lets a short-lived process (typically
//! `cinder start <project>` run from inside another job's script) ask the
//! long-running server to start a job over a token-protected loopback
//! socket.
//!
//! - [`protocol`] defines the request line and response byte.
//! - [`server`] owns the listener and forwards requests to the registry.
//! - [`client`] sends a single request.

pub mod client;
pub mod protocol;
pub mod server;

pub use protocol::{
    Action, ENV_SOCKET_PORT, ENV_SOCKET_TOKEN, Request, Response, TriggerEndpoint,
};
pub use server::TriggerServer;
