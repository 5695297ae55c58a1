//! Scheduler error types.

use thiserror::Error;

use conveyor_db::DbError;
use conveyor_fleet::FleetError;
use conveyor_resource::ResourceError;

#[derive(Debug, Error)]
pub enum StarterError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}
