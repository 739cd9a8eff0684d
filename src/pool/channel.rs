//! Master-side IPC channel to a single worker.
//!
//! A channel owns the write half of the worker's stdin and a reader task on its
//! stdout. Calls are correlated by id, so any number of calls may be in flight
//! at once and their results may arrive in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::WorkerId;
use super::protocol::{CallEnvelope, CallId, WorkRequest, WorkResponse};
use crate::error::{ClusterError, Result};

/// An HTTP call waiting to be forwarded to a worker.
#[derive(Debug, Clone, Default)]
pub struct IncomingCall {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl IncomingCall {
    fn into_envelope(self, id: CallId) -> CallEnvelope {
        CallEnvelope {
            id,
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// The response a worker produced for a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Readiness announcement from a freshly started worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyInfo {
    pub worker_id: WorkerId,
    pub port: u16,
}

/// Resolves once the worker sends `ready`; errors if the channel closes first.
pub type ReadySignal = oneshot::Receiver<ReadyInfo>;

type Delivery = std::result::Result<CallReply, String>;

/// Calls awaiting a result. Once `closed` is set no new calls are accepted.
#[derive(Default)]
struct PendingTable {
    calls: HashMap<CallId, oneshot::Sender<Delivery>>,
    closed: bool,
}

type SharedPending = Arc<Mutex<PendingTable>>;

fn lock(pending: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a pending entry when the waiting call finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingTable>,
    id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).calls.remove(&self.id);
    }
}

/// Handle for sending calls to one worker.
pub struct WorkerChannel {
    worker_id: WorkerId,
    outbox: mpsc::UnboundedSender<String>,
    pending: SharedPending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl WorkerChannel {
    /// Attach to a worker's output (`reader`) and input (`writer`) streams.
    ///
    /// Spawns a reader task routing results to waiting callers and a writer
    /// task serializing outgoing lines. Must be called within a tokio runtime.
    pub fn new<R, W>(worker_id: WorkerId, reader: R, writer: W) -> (Self, ReadySignal)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: SharedPending = Arc::default();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (outbox, inbox) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(worker_id, writer, inbox));
        let reader = tokio::spawn(read_loop(worker_id, reader, pending.clone(), ready_tx));

        let channel = Self {
            worker_id,
            outbox,
            pending,
            next_id: AtomicU64::new(1),
            reader,
        };
        (channel, ready_rx)
    }

    /// Identity of the worker on the other end.
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Number of calls currently awaiting a result.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).calls.len()
    }

    /// Whether the worker's output stream has closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// Forward a call and wait for its correlated result.
    ///
    /// Fails with [`ClusterError::WorkerTimeout`] if no result arrives within
    /// `timeout`, and with [`ClusterError::WorkerCrash`] if the channel closes
    /// first. Dropping the returned future releases the pending entry; the
    /// worker's eventual result is then discarded.
    pub async fn call(&self, call: IncomingCall, timeout: Duration) -> Result<CallReply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let crash = || ClusterError::WorkerCrash {
            worker_id: self.worker_id,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut table = lock(&self.pending);
            if table.closed {
                return Err(crash());
            }
            table.calls.insert(id, tx);
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let line = WorkRequest::Call(call.into_envelope(id)).to_line()?;
        self.outbox.send(line).map_err(|_| crash())?;
        trace!(worker_id = self.worker_id, call_id = id, "Call sent to worker");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(message))) => Err(ClusterError::WorkerFailed {
                worker_id: self.worker_id,
                message,
            }),
            Ok(Err(_)) => Err(crash()),
            Err(_) => Err(ClusterError::WorkerTimeout {
                worker_id: self.worker_id,
                timeout,
            }),
        }
    }

    /// Ask the worker to exit cleanly.
    pub fn request_exit(&self) -> Result<()> {
        let line = WorkRequest::Exit.to_line()?;
        self.outbox.send(line).map_err(|_| ClusterError::WorkerCrash {
            worker_id: self.worker_id,
        })
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn write_loop<W>(worker_id: WorkerId, mut writer: W, mut inbox: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = inbox.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            debug!(worker_id, error = %e, "Worker stdin closed");
            return;
        }
    }
}

async fn read_loop<R>(
    worker_id: WorkerId,
    reader: R,
    pending: SharedPending,
    ready_tx: oneshot::Sender<ReadyInfo>,
) where
    R: AsyncRead + Unpin,
{
    let mut ready_tx = Some(ready_tx);
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(worker_id, error = %e, "Failed to read from worker");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match WorkResponse::from_line(&line) {
            Ok(response) => response,
            Err(e) => {
                warn!(worker_id, error = %e, "Invalid worker response");
                continue;
            }
        };

        let (id, delivery) = match response {
            WorkResponse::Ready {
                worker_id: announced,
                port,
            } => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(ReadyInfo {
                        worker_id: announced,
                        port,
                    });
                }
                continue;
            }
            WorkResponse::Result {
                id,
                status,
                headers,
                body,
            } => (
                id,
                Ok(CallReply {
                    status,
                    headers,
                    body,
                }),
            ),
            WorkResponse::Error { id, message } => (id, Err(message)),
        };

        let waiter = lock(&pending).calls.remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(delivery);
            }
            None => debug!(worker_id, call_id = id, "Discarding result for abandoned call"),
        }
    }

    // Dropping the senders wakes every waiting call with a crash error.
    let orphaned = {
        let mut table = lock(&pending);
        table.closed = true;
        std::mem::take(&mut table.calls)
    };
    if !orphaned.is_empty() {
        warn!(
            worker_id,
            in_flight = orphaned.len(),
            "Worker channel closed with calls in flight"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, duplex};

    /// The worker's side of a test channel.
    struct FakeWorker {
        lines: tokio::io::Lines<BufReader<DuplexStream>>,
        out: DuplexStream,
    }

    impl FakeWorker {
        async fn recv(&mut self) -> WorkRequest {
            let line = self.lines.next_line().await.unwrap().unwrap();
            WorkRequest::from_line(&line).unwrap()
        }

        async fn recv_call(&mut self) -> CallEnvelope {
            match self.recv().await {
                WorkRequest::Call(call) => call,
                other => panic!("Expected call, got {:?}", other),
            }
        }

        async fn send(&mut self, response: WorkResponse) {
            let line = response.to_line().unwrap();
            self.out.write_all(line.as_bytes()).await.unwrap();
        }

        async fn reply(&mut self, id: CallId, body: &str) {
            self.send(WorkResponse::Result {
                id,
                status: 200,
                headers: vec![],
                body: body.to_string(),
            })
            .await;
        }
    }

    fn open(worker_id: WorkerId) -> (WorkerChannel, ReadySignal, FakeWorker) {
        let (master_in, worker_out) = duplex(64 * 1024);
        let (worker_in, master_out) = duplex(64 * 1024);
        let (channel, ready) = WorkerChannel::new(worker_id, master_in, master_out);
        let fake = FakeWorker {
            lines: BufReader::new(worker_in).lines(),
            out: worker_out,
        };
        (channel, ready, fake)
    }

    fn get(path: &str) -> IncomingCall {
        IncomingCall {
            method: "GET".into(),
            path: path.into(),
            ..Default::default()
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_ready_signal() {
        let (_channel, ready, mut worker) = open(3);
        worker
            .send(WorkResponse::Ready {
                worker_id: 3,
                port: 4003,
            })
            .await;
        let info = ready.await.unwrap();
        assert_eq!(info, ReadyInfo {
            worker_id: 3,
            port: 4003
        });
    }

    #[tokio::test]
    async fn test_ready_fails_when_worker_closes() {
        let (_channel, ready, worker) = open(1);
        drop(worker);
        assert!(ready.await.is_err());
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let (channel, _ready, mut worker) = open(1);

        let server = tokio::spawn(async move {
            let call = worker.recv_call().await;
            assert_eq!(call.method, "GET");
            assert_eq!(call.path, "/api/users");
            worker.reply(call.id, "[]").await;
            worker
        });

        let reply = channel.call(get("/api/users"), TIMEOUT).await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "[]");
        assert_eq!(channel.in_flight(), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_correlated_out_of_order() {
        let (channel, _ready, mut worker) = open(1);
        let channel = Arc::new(channel);
        const CALLS: usize = 16;

        // Worker collects every call, then answers in reverse order, echoing the path.
        let server = tokio::spawn(async move {
            let mut calls = Vec::new();
            for _ in 0..CALLS {
                calls.push(worker.recv_call().await);
            }
            for call in calls.into_iter().rev() {
                worker.reply(call.id, &call.path).await;
            }
            worker
        });

        let mut handles = Vec::new();
        for i in 0..CALLS {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                let path = format!("/api/users/{}", i);
                let reply = channel.call(get(&path), TIMEOUT).await.unwrap();
                (path, reply.body)
            }));
        }

        for handle in handles {
            let (sent, received) = handle.await.unwrap();
            assert_eq!(sent, received);
        }
        assert_eq!(channel.in_flight(), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_ids_are_unique() {
        let (channel, _ready, mut worker) = open(1);
        let channel = Arc::new(channel);

        let c1 = channel.clone();
        let c2 = channel.clone();
        let a = tokio::spawn(async move { c1.call(get("/a"), TIMEOUT).await });
        let b = tokio::spawn(async move { c2.call(get("/b"), TIMEOUT).await });

        let first = worker.recv_call().await;
        let second = worker.recv_call().await;
        assert_ne!(first.id, second.id);

        worker.reply(first.id, "1").await;
        worker.reply(second.id, "2").await;
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_timeout_releases_pending_entry() {
        let (channel, _ready, mut worker) = open(4);

        let result = channel.call(get("/slow"), Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(ClusterError::WorkerTimeout { worker_id: 4, .. })
        ));
        assert_eq!(channel.in_flight(), 0);

        // A late result for the abandoned call is discarded without disturbing new calls.
        let late = worker.recv_call().await;
        worker.reply(late.id, "late").await;

        let channel = Arc::new(channel);
        let c = channel.clone();
        let next = tokio::spawn(async move { c.call(get("/next"), TIMEOUT).await });
        let call = worker.recv_call().await;
        worker.reply(call.id, "fresh").await;
        assert_eq!(next.await.unwrap().unwrap().body, "fresh");
    }

    #[tokio::test]
    async fn test_crash_mid_call_fails_waiters() {
        let (channel, _ready, mut worker) = open(2);

        let server = tokio::spawn(async move {
            let _ = worker.recv_call().await;
            drop(worker);
        });

        let result = channel.call(get("/api/users"), TIMEOUT).await;
        assert!(matches!(
            result,
            Err(ClusterError::WorkerCrash { worker_id: 2 })
        ));
        server.await.unwrap();

        assert!(channel.is_closed());
        let result = channel.call(get("/api/users"), TIMEOUT).await;
        assert!(matches!(result, Err(ClusterError::WorkerCrash { .. })));
    }

    #[tokio::test]
    async fn test_worker_error_result() {
        let (channel, _ready, mut worker) = open(5);

        let server = tokio::spawn(async move {
            let call = worker.recv_call().await;
            worker.send(WorkResponse::error(call.id, "invalid method")).await;
            worker
        });

        let result = channel.call(get("/api/users"), TIMEOUT).await;
        match result {
            Err(ClusterError::WorkerFailed { worker_id, message }) => {
                assert_eq!(worker_id, 5);
                assert_eq!(message, "invalid method");
            }
            other => panic!("Expected WorkerFailed, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_call_releases_pending_entry() {
        let (channel, _ready, mut worker) = open(1);
        let channel = Arc::new(channel);

        let c = channel.clone();
        let waiting = tokio::spawn(async move { c.call(get("/api/users"), TIMEOUT).await });
        let _ = worker.recv_call().await;
        assert_eq!(channel.in_flight(), 1);

        waiting.abort();
        let _ = waiting.await;
        assert_eq!(channel.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_request_exit() {
        let (channel, _ready, mut worker) = open(1);
        channel.request_exit().unwrap();
        assert!(matches!(worker.recv().await, WorkRequest::Exit));
    }
}
