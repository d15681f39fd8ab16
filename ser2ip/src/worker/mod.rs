//! Resume-gated workers.
//!
//! Each worker runs as its own task and talks to the bridge in two phases:
//! - **Outcome** (worker -> bridge): at most one pending per worker
//! - **Resume** (bridge -> worker): granted only after the outcome is consumed
//!
//! Workers never share state with each other. Shutdown is explicit through a
//! cancellation token observed at every suspension point.

mod accept;
mod outcome;
mod read;

pub use accept::AcceptWorker;
pub use outcome::{AcceptGate, AcceptOutcome, ReadOutcome, WorkerId};
pub use read::ReadWorker;
