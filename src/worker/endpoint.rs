//! Call endpoint: replays envelopes from the master through the API router.

use axum::{
    Router,
    body::Body,
    http::{Method, Request},
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tower::ServiceExt;
use tracing::{Instrument, debug, info, trace, warn};

use crate::error::Result;
use crate::pool::{CallEnvelope, WorkRequest, WorkResponse, WorkerId, salvage_call_id};

/// Upper bound on a response body read back from the router.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Serve the call protocol until the master closes `input` or sends `exit`.
///
/// Announces `ready` first. Every call runs on its own task, so results are
/// written in completion order. Returns once every started call has been
/// answered (or the output is gone).
pub async fn serve_calls<R, W>(
    worker_id: WorkerId,
    port: u16,
    router: Router,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<WorkResponse>();
    let writer = tokio::spawn(write_loop(output, rx));

    // Cannot fail: the receiver is owned by the writer task.
    let _ = tx.send(WorkResponse::Ready { worker_id, port });

    let mut lines = BufReader::new(input).lines();
    loop {
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => {
                info!(worker_id, "Master closed the channel, exiting");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match WorkRequest::from_line(&line) {
            Ok(WorkRequest::Call(call)) => {
                let tx = tx.clone();
                let router = router.clone();
                let span = tracing::debug_span!(
                    "call",
                    call_id = call.id,
                    request_id = request_id(&call).unwrap_or("-"),
                );
                tokio::spawn(
                    async move {
                        let response = handle_call(router, call).await;
                        if tx.send(response).is_err() {
                            debug!("Output closed, dropping result");
                        }
                    }
                    .instrument(span),
                );
            }
            Ok(WorkRequest::Exit) => {
                info!(worker_id, "Exit requested");
                break;
            }
            Err(e) => {
                warn!(worker_id, error = %e, "Malformed call from master");
                if let Some(id) = salvage_call_id(&line) {
                    let _ = tx.send(WorkResponse::error(id, format!("Malformed call: {}", e)));
                }
            }
        }
    }

    drop(tx);
    match writer.await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(crate::error::ClusterError::Worker(format!(
            "Output writer failed: {}",
            e
        ))),
    }
}

async fn write_loop<W>(mut output: W, mut rx: mpsc::UnboundedReceiver<WorkResponse>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let line = match response.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode response");
                continue;
            }
        };
        trace!(call_id = ?response.call_id(), "Sending to master");
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}

fn request_id(call: &CallEnvelope) -> Option<&str> {
    call.headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("x-request-id"))
        .map(|(_, value)| value.as_str())
}

/// Rebuild the HTTP request, run it through the router, and package the response.
async fn handle_call(router: Router, call: CallEnvelope) -> WorkResponse {
    let id = call.id;
    let request = match build_request(call) {
        Ok(request) => request,
        Err(message) => {
            warn!(call_id = id, %message, "Cannot replay call");
            return WorkResponse::error(id, message);
        }
    };

    let Ok(response) = router.oneshot(request).await;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    match axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES).await {
        Ok(bytes) => WorkResponse::Result {
            id,
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        },
        Err(e) => WorkResponse::error(id, format!("Failed to read response body: {}", e)),
    }
}

fn build_request(call: CallEnvelope) -> std::result::Result<Request<Body>, String> {
    let method = Method::from_bytes(call.method.as_bytes())
        .map_err(|_| format!("Invalid method: {:?}", call.method))?;

    let mut builder = Request::builder().method(method).uri(&call.path);
    for (name, value) in &call.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(call.body))
        .map_err(|e| format!("Invalid request: {}", e))
}
