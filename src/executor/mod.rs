mod worker_pool;

pub use worker_pool::{BatchError, JobError, WorkerPool, WorkerPoolCreationError};
