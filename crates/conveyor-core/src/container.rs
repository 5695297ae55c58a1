//! Container specs and logical identifiers.

use serde::{Deserialize, Serialize};

use crate::resource::{Params, Source, Version};
use crate::worker::WorkerSpec;

/// Logical identity of a container: which step of which build it serves.
/// Containers are discoverable by identifier as well as by opaque handle,
/// so a restarted orchestrator can find its in-flight work again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Step or resource name.
    pub name: String,
    pub job_name: Option<String>,
    pub build_id: Option<i64>,
    /// Set when the caller already knows which worker to look on.
    pub worker_name: Option<String>,
}

/// A volume mounted into a task container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    pub read_only: bool,
}

/// Spec for a resource fetch/publish/check container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceContainerSpec {
    pub resource_type: String,
    pub source: Source,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub worker: WorkerSpec,
}

/// Spec for a task container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub worker: WorkerSpec,
}

/// What to create on a worker. One spec per container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContainerSpec {
    Resource(ResourceContainerSpec),
    Task(TaskContainerSpec),
}

impl ContainerSpec {
    /// The worker-selection predicate for this spec. Resource specs fold
    /// their resource type into the predicate so only workers declaring it
    /// are considered.
    pub fn worker_spec(&self) -> WorkerSpec {
        match self {
            ContainerSpec::Resource(spec) => {
                let mut worker = spec.worker.clone();
                worker.resource_type = Some(spec.resource_type.clone());
                worker
            }
            ContainerSpec::Task(spec) => spec.worker.clone(),
        }
    }
}
