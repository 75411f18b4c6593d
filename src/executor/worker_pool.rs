use std::num::NonZeroUsize;
use std::pin::pin;
use std::thread::available_parallelism;

use compio::dispatcher::{Dispatcher, DispatcherBuilder};
use compio::runtime::spawn;
use futures::StreamExt;
use futures::future::{Either, select};
use futures_channel::mpsc::{self, UnboundedSender};
use snafu::{ResultExt, Snafu};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default number of worker threads when unable to determine system parallelism
const DEFAULT_WORKER_THREADS: NonZeroUsize = NonZeroUsize::MIN;

type JobResult<R> = (usize, Result<R, JobError>);

/// Runs lock tool invocations on dedicated worker threads so the coordinating
/// task never waits on a subprocess itself.
pub struct WorkerPool {
    dispatcher: Dispatcher,
}

impl WorkerPool {
    pub fn new() -> Result<Self, WorkerPoolCreationError> {
        Self::with_workers(Self::determine_worker_count())
    }

    pub fn with_workers(workers: NonZeroUsize) -> Result<Self, WorkerPoolCreationError> {
        debug!("Using {} worker threads for lock operations", workers);

        let dispatcher = DispatcherBuilder::new()
            .worker_threads(workers)
            .build()
            .context(DispatcherSnafu)?;

        Ok(Self { dispatcher })
    }

    /// Determines the optimal number of worker threads
    fn determine_worker_count() -> NonZeroUsize {
        available_parallelism().unwrap_or(DEFAULT_WORKER_THREADS)
    }

    /// Dispatches every job and waits until all of them reported back.
    ///
    /// Results come back in submission order. If `cancellation` fires first the
    /// batch returns [`BatchError::Cancelled`]; jobs already running are left to
    /// finish and whatever they produce is dropped.
    pub async fn run_batch<F, Fut, R>(
        &self,
        jobs: Vec<F>,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Result<R, JobError>>, BatchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + 'static,
        R: Send + 'static,
    {
        let total = jobs.len();
        if cancellation.is_cancelled() {
            return Err(BatchError::Cancelled { jobs: total });
        }

        let (result_sender, mut result_receiver) = mpsc::unbounded::<JobResult<R>>();
        for (index, job) in jobs.into_iter().enumerate() {
            self.dispatch_job(index, job, result_sender.clone());
        }
        drop(result_sender);
        debug!("Dispatched {} jobs", total);

        let collect = async {
            let mut results: Vec<Option<Result<R, JobError>>> = (0..total).map(|_| None).collect();
            while let Some((index, result)) = result_receiver.next().await {
                debug!("Job {} reported back", index);
                results[index] = Some(result);
            }
            results
        };

        match select(pin!(collect), pin!(cancellation.cancelled())).await {
            Either::Left((results, _)) => Ok(results
                .into_iter()
                .map(|result| result.unwrap_or(Err(JobError::ResultLost)))
                .collect()),
            Either::Right(_) => {
                info!("Batch of {} jobs cancelled, discarding its results", total);
                Err(BatchError::Cancelled { jobs: total })
            }
        }
    }

    /// Dispatch a job to a worker and forward its result to the batch receiver
    fn dispatch_job<F, Fut, R>(&self, index: usize, job: F, sender: UnboundedSender<JobResult<R>>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + 'static,
        R: Send + 'static,
    {
        let receiver = match self.dispatcher.dispatch(job) {
            Ok(receiver) => receiver,
            Err(e) => {
                let error = JobError::DispatchError {
                    error: e.to_string(),
                };
                if let Err(send_err) = sender.unbounded_send((index, Err(error))) {
                    debug!("Failed to report dispatch error for job {}: {}", index, send_err);
                }
                return;
            }
        };

        spawn(async move {
            let result = match receiver.await {
                Ok(value) => Ok(value),
                Err(e) => {
                    debug!("Job {} was canceled: {}", index, e);
                    Err(JobError::CanceledError { source: e })
                }
            };

            if let Err(send_err) = sender.unbounded_send((index, result)) {
                debug!("Failed to send result of job {}: {}", index, send_err);
            }
        })
        .detach();
    }
}

#[derive(Debug, Snafu)]
pub enum WorkerPoolCreationError {
    #[snafu(display("Failed to create worker dispatcher"))]
    DispatcherError { source: std::io::Error },
}

#[derive(Debug, Snafu)]
pub enum JobError {
    #[snafu(display("Failed to dispatch job: {}", error))]
    DispatchError { error: String },
    #[snafu(display("Job got cancelled"))]
    CanceledError {
        source: futures_channel::oneshot::Canceled,
    },
    #[snafu(display("Job finished without reporting a result"))]
    ResultLost,
}

#[derive(Debug, Snafu)]
pub enum BatchError {
    #[snafu(display("Batch of {} jobs was cancelled", jobs))]
    Cancelled { jobs: usize },
}
