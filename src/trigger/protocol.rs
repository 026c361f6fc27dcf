// src/trigger/protocol.rs

//! Wire format of the remote trigger protocol.
//!
//! A request is one line:
//!
//! ```text
//! <token> <action-code> <payload-length> <payload>\n
//! ```
//!
//! The response is a single status byte followed by `\n`.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use rand::Rng;

use crate::errors::{CinderError, Result};
use crate::store::Params;

/// Environment variable carrying the listener port.
pub const ENV_SOCKET_PORT: &str = "SOCKET_PORT";
/// Environment variable carrying the shared token.
pub const ENV_SOCKET_TOKEN: &str = "SOCKET_TOKEN";

pub const TOKEN_LENGTH: usize = 32;
const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Requested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start a job; the payload is the project name.
    Start,
}

impl Action {
    pub fn code(self) -> u8 {
        match self {
            Action::Start => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Action::Start),
            _ => None,
        }
    }
}

/// Single-byte answer to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Fail,
}

impl Response {
    pub fn code(self) -> u8 {
        match self {
            Response::Ok => 0,
            Response::Fail => 1,
        }
    }

    /// Any byte other than `0` is a failure.
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            Response::Ok
        } else {
            Response::Fail
        }
    }

    /// Bytes written back to the client.
    pub fn encode(self) -> [u8; 2] {
        [self.code(), b'\n']
    }
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub token: String,
    pub action: Action,
    pub payload: String,
}

impl Request {
    pub fn new(token: impl Into<String>, action: Action, payload: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            action,
            payload: payload.into(),
        }
    }

    /// Request line including the trailing newline.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }

    /// Parse a request line and check it against `expected_token`.
    ///
    /// Fails on a wrong token, a payload whose length does not match the
    /// announced one, or an unknown action.
    pub fn parse(line: &str, expected_token: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(4, ' ');

        let token = parts.next().unwrap_or_default();
        let action = parts
            .next()
            .and_then(|raw| raw.parse::<u8>().ok())
            .ok_or_else(|| protocol_error("missing or malformed action code"))?;
        let length = parts
            .next()
            .and_then(|raw| raw.parse::<usize>().ok())
            .ok_or_else(|| protocol_error("missing or malformed payload length"))?;
        let payload = parts.next().unwrap_or_default();

        if !tokens_match(token, expected_token) {
            return Err(protocol_error("token mismatch"));
        }
        if payload.len() != length {
            return Err(protocol_error(format!(
                "payload length mismatch: announced {length}, got {}",
                payload.len()
            )));
        }
        let action = Action::from_code(action)
            .ok_or_else(|| protocol_error(format!("unknown action code {action}")))?;

        Ok(Self::new(token, action, payload))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.token,
            self.action.code(),
            self.payload.len(),
            self.payload
        )
    }
}

/// Where a running server listens and the token it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEndpoint {
    pub port: u16,
    pub token: String,
}

impl TriggerEndpoint {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    /// Variables that let a child process reach this endpoint.
    pub fn env_vars(&self) -> Params {
        Params::from([
            (ENV_SOCKET_PORT.to_string(), self.port.to_string()),
            (ENV_SOCKET_TOKEN.to_string(), self.token.clone()),
        ])
    }

    /// Read the endpoint from `SOCKET_PORT` / `SOCKET_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let port = std::env::var(ENV_SOCKET_PORT)
            .ok()
            .and_then(|raw| raw.trim().parse::<u16>().ok())
            .ok_or_else(|| {
                CinderError::ConfigError(format!("{ENV_SOCKET_PORT} is not set to a valid port"))
            })?;
        let token = std::env::var(ENV_SOCKET_TOKEN)
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| CinderError::ConfigError(format!("{ENV_SOCKET_TOKEN} is not set")))?;

        Ok(Self { port, token })
    }
}

/// Fresh random token of [`TOKEN_LENGTH`] lowercase alphanumerics.
pub fn random_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Comparison that does not stop at the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn protocol_error(msg: impl Into<String>) -> CinderError {
    CinderError::ProtocolError(msg.into())
}
