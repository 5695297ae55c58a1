//! Build scheduling for the Conveyor build service.
//!
//! The starter walks pending builds job by job; the serial-group throttle
//! decides whether each may start; the launcher drives the worker pool and
//! the resource runner for admitted builds.

pub mod abort;
pub mod error;
pub mod launcher;
pub mod max_in_flight;
pub mod starter;

pub use abort::AbortBus;
pub use error::StarterError;
pub use launcher::ResourceLauncher;
pub use max_in_flight::{MaxInFlightUpdater, SerialGroupThrottle};
pub use starter::{BuildLauncher, BuildStarter};
