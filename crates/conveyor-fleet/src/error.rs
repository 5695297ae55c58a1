//! Fleet error types.

use thiserror::Error;

use conveyor_core::worker::WorkerSpec;
use conveyor_core::RuntimeError;
use conveyor_db::DbError;

#[derive(Debug, Error)]
pub enum FleetError {
    /// The registry has no live workers at all.
    #[error("no workers registered")]
    NoWorkers,

    /// Workers exist but none can take the spec. Carries the predicate and
    /// the names of every worker examined, for the scheduler's diagnostics.
    #[error("no workers satisfy {spec:?} (examined: {workers:?})")]
    NoCompatibleWorkers {
        spec: WorkerSpec,
        workers: Vec<String>,
    },

    /// A container record points at a worker the registry no longer knows.
    #[error("worker for container is no longer registered")]
    MissingWorker,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
