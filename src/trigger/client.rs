// src/trigger/client.rs

//! Client side of the remote trigger protocol, used by `cinder start`.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::{CinderError, Result};
use crate::trigger::protocol::{Action, Request, Response, TriggerEndpoint};

/// Send one request and wait for the server's answer.
pub async fn send(endpoint: &TriggerEndpoint, action: Action, payload: &str) -> Result<Response> {
    let stream = TcpStream::connect(endpoint.address()).await?;
    let (reader, mut writer) = stream.into_split();

    let request = Request::new(endpoint.token.clone(), action, payload);
    writer.write_all(request.encode().as_bytes()).await?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader);
    let mut answer = Vec::new();
    reader.read_until(b'\n', &mut answer).await?;

    let code = answer
        .first()
        .copied()
        .ok_or_else(|| CinderError::ProtocolError("empty response".to_string()))?;
    let response = Response::from_code(code);
    debug!(code, ?response, "trigger response");
    Ok(response)
}

/// Ask the server to start a job for `project`.
pub async fn start_project(endpoint: &TriggerEndpoint, project: &str) -> Result<Response> {
    send(endpoint, Action::Start, project).await
}
