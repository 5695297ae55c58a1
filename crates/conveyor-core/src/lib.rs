//! Core domain types and runtime traits for the Conveyor CI build service.
//!
//! This crate contains:
//! - Opaque handles for containers and volumes
//! - Build and job scheduling types
//! - Worker records and the worker-selection predicate
//! - Container specs and logical identifiers
//! - Resource version and metadata types
//! - The container-host capability traits consumed by the execution pipeline

pub mod build;
pub mod container;
pub mod error;
pub mod id;
pub mod io;
pub mod metrics;
pub mod resource;
pub mod runtime;
pub mod worker;

pub use error::{RuntimeError, RuntimeResult};
pub use id::Handle;
