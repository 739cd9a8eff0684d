//! In-memory workers for unit tests.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::task::JoinHandle;

use super::WorkerId;
use super::channel::{ReadySignal, WorkerChannel};
use super::protocol::{WorkRequest, WorkResponse};
use super::registry::Worker;

/// A worker whose streams are already closed.
pub fn idle_worker(id: WorkerId) -> Arc<Worker> {
    let (a, _b) = duplex(64);
    let (c, _d) = duplex(64);
    let (channel, _ready) = WorkerChannel::new(id, a, c);
    Arc::new(Worker::new(id, None, 4000 + id as u16, channel))
}

/// Worker-side ends of an in-memory channel.
pub struct WorkerPipes {
    pub stdin: DuplexStream,
    pub stdout: DuplexStream,
}

/// Create a channel plus the pipes a fake worker would own.
pub fn channel_pair(id: WorkerId) -> (WorkerChannel, ReadySignal, WorkerPipes) {
    let (master_in, worker_out) = duplex(64 * 1024);
    let (worker_in, master_out) = duplex(64 * 1024);
    let (channel, ready) = WorkerChannel::new(id, master_in, master_out);
    (
        channel,
        ready,
        WorkerPipes {
            stdin: worker_in,
            stdout: worker_out,
        },
    )
}

/// Serve calls on `pipes`, answering each with `"{id}:{path}"` and status 200.
///
/// Announces `ready` first. Returns when the master side closes or sends `exit`.
pub fn spawn_echo(id: WorkerId, pipes: WorkerPipes) -> JoinHandle<()> {
    tokio::spawn(async move {
        let WorkerPipes { stdin, mut stdout } = pipes;
        let ready = WorkResponse::Ready {
            worker_id: id,
            port: 4000 + id as u16,
        };
        if stdout
            .write_all(ready.to_line().unwrap().as_bytes())
            .await
            .is_err()
        {
            return;
        }

        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let call = match WorkRequest::from_line(&line) {
                Ok(WorkRequest::Call(call)) => call,
                _ => return,
            };
            let reply = WorkResponse::Result {
                id: call.id,
                status: 200,
                headers: vec![("content-type".into(), "text/plain".into())],
                body: format!("{}:{}", id, call.path),
            };
            if stdout
                .write_all(reply.to_line().unwrap().as_bytes())
                .await
                .is_err()
            {
                return;
            }
        }
    })
}

/// A registered worker answering every call with `"{id}:{path}"`.
pub fn echo_worker(id: WorkerId) -> Arc<Worker> {
    let (channel, _ready, pipes) = channel_pair(id);
    spawn_echo(id, pipes);
    Arc::new(Worker::new(id, None, 4000 + id as u16, channel))
}
