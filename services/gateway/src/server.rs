//! Newline-delimited JSON transport.
//!
//! Each input line is a request `{id, method, params}`; each output line is a
//! response `{id, result}` or `{id, error}`. Tool calls run concurrently and
//! may answer out of order. Logs never go to the output stream.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::session::GatewaySession;
use crate::shutdown::ShutdownCoordinator;

/// Responses waiting for the writer.
const OUTBOUND_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Serves one [`GatewaySession`] over a line-oriented byte stream.
#[derive(Debug)]
pub struct StdioServer {
    session: Arc<GatewaySession>,
    shutdown_timeout: Duration,
}

impl StdioServer {
    #[must_use]
    pub const fn new(session: Arc<GatewaySession>, shutdown_timeout: Duration) -> Self {
        Self {
            session,
            shutdown_timeout,
        }
    }

    /// Read requests until end of input or until `shutdown` resolves.
    ///
    /// At end of input in-flight calls get the shutdown timeout to finish.
    /// When `shutdown` resolves they are cancelled at once and their
    /// responses are flushed within the same bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer task cannot be joined.
    pub async fn run<R, W, S>(&self, reader: R, writer: W, shutdown: S) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let writer_task = tokio::spawn(write_responses(writer, rx));
        let mut coordinator = ShutdownCoordinator::new();
        let in_flight: InFlight = Arc::default();

        let mut lines = reader.lines();
        tokio::pin!(shutdown);
        info!("Serving requests on stdio");

        let signalled = loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break true;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => {
                        self.dispatch(&line, &tx, &in_flight, &mut coordinator).await;
                    }
                    Ok(None) => {
                        info!("Input closed");
                        break false;
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to read request");
                        break false;
                    }
                },
            }
            coordinator.reap();
        };

        // A signal cancels in-flight calls; closed input lets them answer
        let aborted = if signalled {
            coordinator.shutdown(self.shutdown_timeout).await
        } else {
            coordinator.finish(self.shutdown_timeout).await
        };
        if aborted > 0 {
            warn!(aborted, "Calls still running at shutdown were aborted");
        }
        drop(tx);
        writer_task.await?;
        Ok(())
    }

    async fn dispatch(
        &self,
        line: &str,
        tx: &mpsc::Sender<Value>,
        in_flight: &InFlight,
        coordinator: &mut ShutdownCoordinator,
    ) {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "Unparseable request line");
                let err = GatewayError::validation("Request is not a valid JSON request object");
                send(tx, error_response(Value::Null, &err)).await;
                return;
            }
        };
        debug!(method = %request.method, id = %request.id, "Request received");

        match request.method.as_str() {
            "initialize" => {
                let response = match self.session.handshake(&request.params) {
                    Ok(handshake) => match serde_json::to_value(handshake) {
                        Ok(result) => json!({"id": request.id, "result": result}),
                        Err(err) => error_response(request.id, &GatewayError::Internal(err.into())),
                    },
                    Err(err) => error_response(request.id, &err),
                };
                send(tx, response).await;
            }
            "tools/list" => {
                let tools = self.session.list_tools();
                send(tx, json!({"id": request.id, "result": {"tools": tools}})).await;
            }
            "tools/call" => self.spawn_call(request, tx, in_flight, coordinator),
            "notifications/cancelled" => {
                let target = request.params.get("request_id").cloned().unwrap_or_default();
                let token = in_flight.lock().get(&target.to_string()).cloned();
                match token {
                    Some(token) => {
                        info!(request_id = %target, "Cancelling call");
                        token.cancel();
                    }
                    None => debug!(request_id = %target, "Nothing in flight to cancel"),
                }
            }
            "ping" => {
                send(tx, json!({"id": request.id, "result": self.session.health()})).await;
            }
            other => {
                let err = GatewayError::validation(format!("Unknown method: {other}"));
                send(tx, error_response(request.id, &err)).await;
            }
        }
    }

    fn spawn_call(
        &self,
        request: Request,
        tx: &mpsc::Sender<Value>,
        in_flight: &InFlight,
        coordinator: &mut ShutdownCoordinator,
    ) {
        let key = request.id.to_string();
        // Cancelled by the client or by shutdown, whichever comes first
        let cancel = coordinator.token().child_token();
        in_flight.lock().insert(key.clone(), cancel.clone());

        let session = Arc::clone(&self.session);
        let in_flight = Arc::clone(in_flight);
        let tx = tx.clone();
        coordinator.spawn("tools/call", async move {
            let result = session.invoke(&request.params, &cancel).await;
            in_flight.lock().remove(&key);
            send(&tx, json!({"id": request.id, "result": result})).await;
        });
    }
}

/// Error answer to a request that never reached a tool.
fn error_response(id: Value, err: &GatewayError) -> Value {
    let mut error = json!({
        "code": err.code().as_str(),
        "message": err.public_message(),
    });
    if let Some(details) = err.details() {
        error["details"] = details;
    }
    json!({"id": id, "error": error})
}

async fn send(tx: &mpsc::Sender<Value>, response: Value) {
    if tx.send(response).await.is_err() {
        warn!("Response dropped, writer has stopped");
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<Value>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "Failed to encode response");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(err) = writer.write_all(&line).await {
            error!(error = %err, "Failed to write response");
            return;
        }
        if let Err(err) = writer.flush().await {
            error!(error = %err, "Failed to flush response");
            return;
        }
    }
}
