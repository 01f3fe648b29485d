// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod api;
pub mod error;
pub mod fetcher;
pub mod interval;
pub mod metrics;
pub mod monitor;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod types;

// These modules are only needed by the binary.
// Declared pub so integration tests can reach them if needed.
pub mod cli;
pub mod config;
pub mod logging;
