//! Container-host clients for the Conveyor build service.
//!
//! The build pipeline consumes the capability traits in
//! `conveyor_core::runtime`; this crate provides the Docker-backed client
//! used when workers expose a Docker daemon as their container host.

pub mod docker;

pub use docker::{DockerDialer, DockerHost};
