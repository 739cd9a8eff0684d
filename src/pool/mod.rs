//! Supervised pool of worker subprocesses.
//!
//! The master owns a fixed-size pool of worker processes. Each worker is the
//! same binary re-executed in worker mode; it talks to the master over its
//! stdin/stdout using newline-delimited JSON.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────────┐
//!                     │        Master Process       │
//!                     │ Dispatcher ─► PoolRegistry  │
//!                     │ Supervisor ─┘               │
//!                     └──────────────┬──────────────┘
//!                                    │ stdin/stdout
//!               ┌────────────────────┼────────────────────┐
//!               │                    │                    │
//!         ┌─────▼─────┐        ┌─────▼─────┐        ┌─────▼─────┐
//!         │ Worker 1  │        │ Worker 2  │        │ Worker N  │
//!         │ :base+1   │        │ :base+2   │        │ :base+N   │
//!         └───────────┘        └───────────┘        └───────────┘
//! ```
//!
//! # Features
//!
//! - **Correlated calls**: many calls may be in flight per worker; results are
//!   matched to callers by id, never by arrival order
//! - **Crash recovery**: exited workers are replaced under a fresh id
//! - **Pluggable selection**: [`SelectionPolicy`], round-robin by default

mod balancer;
mod channel;
mod protocol;
mod registry;
mod signals;
mod spawn;
mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

/// Worker identity, assigned by the supervisor and never reused.
pub type WorkerId = u32;

pub use balancer::{RoundRobin, SelectionPolicy};
pub use channel::{CallReply, IncomingCall};
pub use protocol::{CallEnvelope, WorkRequest, WorkResponse, salvage_call_id};
pub use registry::{PoolRegistry, Worker};
pub use spawn::{ENV_PASSWORD, ENV_USERNAME, ProcessLauncher, WorkerConfig};
pub use supervisor::{Supervisor, SupervisorConfig, default_worker_count};
