//! Benzene air-quality monitor.
//!
//! Polls the live emission data page on wall-clock aligned boundaries,
//! extracts the five station benzene readings and appends them to a CSV
//! log, surviving fetch, parse and disk failures indefinitely.
//!
//! Layers, outermost first:
//! - `supervisor` — restarts the polling loop with a fresh client after a fault.
//! - `runner` — one fetch -> extract -> record cycle per boundary.
//! - `schedule` — boundary arithmetic and interruptible waits.
//! - `extract` / `recorder` — the pure parser and the append-only sink.

pub mod config;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod recorder;
pub mod runner;
pub mod schedule;
pub mod shutdown;
pub mod supervisor;
