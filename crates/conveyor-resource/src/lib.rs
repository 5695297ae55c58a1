//! Container-scoped resource execution.
//!
//! A resource container carries `/opt/resource/{in,out,check}` scripts
//! speaking a JSON protocol over stdin/stdout. This crate drives them with
//! three guarantees the scheduler depends on:
//!
//! - **Memoization**: a completed run's stdout is persisted verbatim as a
//!   container property, so a repeated invocation returns the same bytes
//!   without running anything.
//! - **Reattach**: the spawned process id is persisted before the run is
//!   awaited, so a restarted orchestrator resumes the wait instead of
//!   spawning a second script.
//! - **Abort**: any value on the signal channel stops the container
//!   (gracefully) and resolves to the [`ResourceError::Aborted`] sentinel.

pub mod error;
mod runner;
pub mod resource;

pub use error::{ResourceError, ScriptFailure};
pub use resource::{IoConfig, Resource, VersionedSource};
pub use runner::{PROCESS_PROPERTY, RESULT_PROPERTY};
