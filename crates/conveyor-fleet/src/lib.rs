//! Worker fleet management for the Conveyor build service.
//!
//! The registry is the durable directory of workers; this crate turns its
//! records into live clients and load-balances container placement across
//! them.

pub mod error;
pub mod pool;
pub mod provider;
pub mod worker;

pub use error::FleetError;
pub use pool::Pool;
pub use provider::{DbWorkerProvider, WorkerDialer, WorkerProvider};
pub use worker::{RemoteWorker, Worker};
