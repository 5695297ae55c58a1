//! Worker records and the worker-selection predicate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resource type a worker can host: the type name plus the container image
/// that implements its scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    #[serde(rename = "type")]
    pub name: String,
    pub image: String,
}

/// Durable record of an execution host, as held by the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub name: String,
    /// Address of the container host.
    pub container_host_addr: String,
    /// Address of the volume host, when the worker runs one.
    pub volume_host_addr: Option<String>,
    pub http_proxy_url: Option<String>,
    pub https_proxy_url: Option<String>,
    pub no_proxy: Option<String>,
    /// Advisory count refreshed on each heartbeat; never a hard limit.
    pub active_containers: i32,
    pub resource_types: Vec<ResourceType>,
    pub platform: String,
    pub tags: Vec<String>,
    /// Owning team; zero means the worker is reachable by every team.
    pub team_id: i64,
    /// Unix timestamp the worker process came up.
    pub start_time: i64,
}

/// Worker-selection predicate carried by a container spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub platform: String,
    pub tags: Vec<String>,
    pub team_id: i64,
    pub resource_type: Option<String>,
}

/// Why a worker cannot take a given container spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerMismatch {
    #[error("worker does not support resource type {0:?}")]
    UnsupportedResourceType(String),

    #[error("worker platform {have:?} does not match requested platform {want:?}")]
    IncompatiblePlatform { want: String, have: String },

    #[error("worker tags do not match the requested tags")]
    MismatchedTags,

    #[error("worker belongs to another team")]
    ForeignTeam,
}

impl WorkerInfo {
    /// Capability check: can this worker host a container with the given
    /// requirements? Checks are ordered cheapest-first; the first mismatch
    /// is returned for diagnostics.
    pub fn satisfying(&self, spec: &WorkerSpec) -> Result<(), WorkerMismatch> {
        if let Some(wanted) = &spec.resource_type {
            if !self.resource_types.iter().any(|rt| rt.name == *wanted) {
                return Err(WorkerMismatch::UnsupportedResourceType(wanted.clone()));
            }
        }

        if !spec.platform.is_empty() && spec.platform != self.platform {
            return Err(WorkerMismatch::IncompatiblePlatform {
                want: spec.platform.clone(),
                have: self.platform.clone(),
            });
        }

        // Every requested tag must be present, and a tagged worker only
        // receives work that asked for it.
        let tags_match = if spec.tags.is_empty() {
            self.tags.is_empty()
        } else {
            spec.tags.iter().all(|t| self.tags.contains(t))
        };
        if !tags_match {
            return Err(WorkerMismatch::MismatchedTags);
        }

        if self.team_id != 0 && self.team_id != spec.team_id {
            return Err(WorkerMismatch::ForeignTeam);
        }

        Ok(())
    }
}
