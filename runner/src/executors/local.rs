use super::ExecutorError;
use crate::{collection::RunCollection, distributor::jobs_per_node, job::Job};
use parking_lot::Mutex;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    fs::File,
    io,
    path::PathBuf,
    process::{Command, Stdio},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

/// Outcome of a local run
#[derive(Debug, Clone, Default)]
pub struct LocalReport {
    pub succeeded: usize,
    pub failed: Vec<PathBuf>,
}

/// Executor that works on a local thread pool, one job per `threads` cores
#[derive(Debug)]
pub struct LocalExecutor<'a> {
    jobs: &'a [Job],
    shell_line: String,
    workers: usize,
    walltime: Option<Duration>,
}

impl<'a> LocalExecutor<'a> {
    /// jobs must already be materialized
    pub fn load(collection: &'a RunCollection) -> Result<Self, ExecutorError> {
        let exec = collection.exec_param();
        let workers = jobs_per_node(exec.max_cores, exec.threads)?;
        let shell_line = exec
            .job_preamble
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(collection.command()))
            .collect::<Vec<_>>()
            .join(" && ");

        Ok(Self {
            jobs: collection.jobs(),
            shell_line,
            workers,
            walltime: exec.walltime(),
        })
    }

    /// execute jobs concurrently with a bounded thread pool
    #[instrument(skip(self), level = "info")]
    pub fn execute(&self) -> Result<LocalReport, ExecutorError> {
        debug!("Starting thread pool with {} threads", self.workers);

        let pool = ThreadPoolBuilder::new().num_threads(self.workers).build()?;

        // general counters to provide progress
        let total = self.jobs.len();
        let processed = AtomicU64::new(0);
        let failed = Mutex::new(Vec::new());

        pool.install(|| {
            self.jobs.par_iter().for_each(|job| {
                let start = Instant::now();

                match self.run(job) {
                    Ok(true) => debug!(job = %job, "Finished in {} ms", start.elapsed().as_millis()),
                    Ok(false) => {
                        warn!(job = %job, "Job failed");
                        failed.lock().push(job.path().to_path_buf());
                    }
                    Err(error) => {
                        warn!(job = %job, error = ?error, "Failed to run job");
                        failed.lock().push(job.path().to_path_buf());
                    }
                }

                info!(
                    "Done with {}/{total}",
                    processed.fetch_add(1, Ordering::SeqCst) + 1
                );
            })
        });

        let failed = failed.into_inner();
        info!("Done with processing, {} of {total} failed", failed.len());

        Ok(LocalReport {
            succeeded: total - failed.len(),
            failed,
        })
    }

    fn run(&self, job: &Job) -> io::Result<bool> {
        let stdout = File::create(job.path().join("output.log"))?;
        let stderr = File::create(job.path().join("error.log"))?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.shell_line)
            .current_dir(job.path())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()?;

        match self.walltime {
            Some(limit) => match child.wait_timeout(limit)? {
                Some(status) => Ok(status.success()),
                None => {
                    // child hasn't exited yet
                    warn!(job = %job, "Job exceeded its wall time of {}s", limit.as_secs());
                    child.kill()?;
                    child.wait()?;

                    Ok(false)
                }
            },
            None => Ok(child.wait()?.success()),
        }
    }
}
