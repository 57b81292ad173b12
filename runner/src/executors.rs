pub mod local;

use crate::distributor::CapacityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to build the worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Jobs do not fit on this machine")]
    Capacity(#[from] CapacityError),
}
