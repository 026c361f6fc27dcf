// src/trigger/server.rs

//! Loopback listener for the remote trigger protocol.
//!
//! Each connection carries exactly one request and one response. Reading the
//! request line has no timeout: the listener only binds to loopback and
//! requires the shared token, so a stalled client only ties up its own
//! connection task.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{Registry, StartOutcome};
use crate::errors::Result;
use crate::store::Params;
use crate::trigger::protocol::{Action, Request, Response, TriggerEndpoint, random_token};

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct TriggerServer {
    listener: TcpListener,
    endpoint: TriggerEndpoint,
}

impl TriggerServer {
    /// Bind an ephemeral loopback port and generate a fresh token.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
        let port = listener.local_addr()?.port();
        let endpoint = TriggerEndpoint {
            port,
            token: random_token(),
        };

        info!(port, "trigger socket listening");
        Ok(Self { listener, endpoint })
    }

    pub fn endpoint(&self) -> &TriggerEndpoint {
        &self.endpoint
    }

    /// Run the accept loop on its own task.
    pub fn spawn(self, registry: Registry) -> JoinHandle<()> {
        tokio::spawn(self.run(registry))
    }

    /// Accept connections forever, one task per connection.
    pub async fn run(self, registry: Registry) {
        let token: Arc<str> = Arc::from(self.endpoint.token.as_str());

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "trigger connection");
                    let registry = registry.clone();
                    let token = Arc::clone(&token);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, &token, &registry).await {
                            debug!(%addr, error = %err, "trigger connection error");
                        }
                    });
                }
                Err(err) => {
                    error!(error = %err, "trigger accept error");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, token: &str, registry: &Registry) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let response = match reader.read_line(&mut line).await {
        Ok(_) => match Request::parse(&line, token) {
            Ok(request) => dispatch(registry, &request),
            Err(err) => {
                warn!(error = %err, "rejecting trigger request");
                Response::Fail
            }
        },
        Err(err) => {
            warn!(error = %err, "could not read trigger request");
            Response::Fail
        }
    };

    writer.write_all(&response.encode()).await?;
    writer.shutdown().await
}

fn dispatch(registry: &Registry, request: &Request) -> Response {
    match request.action {
        Action::Start => {
            let project = registry.open_project(&request.payload);
            match registry.start_job(&project, Params::new()) {
                StartOutcome::Started(job) => {
                    info!(project = %project.name(), %job, "job started via trigger socket");
                    Response::Ok
                }
                outcome => {
                    info!(project = %project.name(), ?outcome, "trigger start refused");
                    Response::Fail
                }
            }
        }
    }
}
