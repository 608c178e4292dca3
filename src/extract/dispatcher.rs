//! Extraction dispatcher
//!
//! Fans a batch of extraction tasks out over a bounded worker pool and
//! collects exactly one result per distinct URL. A task that errors, panics,
//! times out or is cancelled still produces an (empty) result.
//!
//! Tasks run through a [`TaskRunner`]. The default runner starts one
//! `sumi-glean worker` child process per task and talks to it over
//! stdin/stdout, so a crashing browser can only take its own task down.

use crate::extract::task::{ExtractionResult, ExtractionTask};
use crate::extract::worker::ExtractionWorker;
use crate::extract::ExtractError;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Batches at or below this size run one task at a time
pub const SEQUENTIAL_BATCH_LIMIT: usize = 2;

/// Pool size for a batch: `min(max_workers or cpu_count, url_count, cpu_count)`
pub fn effective_workers(max_workers: Option<usize>, url_count: usize, cpu_count: usize) -> usize {
    max_workers
        .unwrap_or(cpu_count)
        .min(url_count)
        .min(cpu_count)
}

/// Executes one extraction task in some isolated context
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: ExtractionTask) -> Result<ExtractionResult, ExtractError>;
}

/// Runs tasks on their own tokio task inside this process
pub struct InProcessRunner {
    worker: Arc<ExtractionWorker>,
}

impl InProcessRunner {
    pub fn new(worker: ExtractionWorker) -> Self {
        Self {
            worker: Arc::new(worker),
        }
    }
}

/// Aborts the wrapped task when dropped, so cancelling the caller stops it too
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[async_trait]
impl TaskRunner for InProcessRunner {
    async fn run(&self, task: ExtractionTask) -> Result<ExtractionResult, ExtractError> {
        let worker = Arc::clone(&self.worker);
        let mut handle = AbortOnDrop(tokio::spawn(async move { worker.extract(&task).await }));

        (&mut handle.0).await.map_err(|e| {
            if e.is_panic() {
                ExtractError::Worker("extraction task panicked".to_string())
            } else {
                ExtractError::Worker(e.to_string())
            }
        })
    }
}

/// Runs every task in a fresh child process
///
/// The child receives the task as JSON on stdin and answers with the result
/// as JSON on stdout. On Unix the child leads its own process group, and
/// dropping the run kills that whole group, browser included.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    program: PathBuf,
    args: Vec<String>,
}

impl SubprocessRunner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-executes the running binary as `<exe> worker`
    pub fn current_exe() -> Result<Self, ExtractError> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".to_string()]))
    }
}

/// Kills a worker's process group when dropped
///
/// Runs after the worker has been reaped too, which takes down anything it
/// left behind in its group.
#[cfg_attr(not(unix), allow(dead_code))]
struct ProcessGroup(Option<u32>);

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(group) = self.0.and_then(|id| libc::pid_t::try_from(id).ok()) else {
            return;
        };

        // SAFETY: killpg only sends a signal; an already empty group yields ESRCH.
        if unsafe { libc::killpg(group, libc::SIGKILL) } == 0 {
            debug!("Killed worker process group {}", group);
        }
    }
}

#[async_trait]
impl TaskRunner for SubprocessRunner {
    async fn run(&self, task: ExtractionTask) -> Result<ExtractionResult, ExtractError> {
        let message = serde_json::to_vec(&task)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;
        let _group = ProcessGroup(child.id());

        debug!("Started worker process {:?} for {}", child.id(), task.url);

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&message).await?;
            stdin.shutdown().await?;
        }

        let mut reply = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_end(&mut reply).await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ExtractError::Worker(format!(
                "worker for {} exited with {}",
                task.url, status
            )));
        }

        Ok(serde_json::from_slice(&reply)?)
    }
}

/// Fans extraction tasks out over a bounded pool
pub struct Dispatcher {
    runner: Arc<dyn TaskRunner>,
    max_workers: Option<usize>,
    cpu_count: usize,
    show_progress: bool,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            runner,
            max_workers: None,
            cpu_count: num_cpus::get(),
            show_progress: false,
        }
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_cpu_count(mut self, cpu_count: usize) -> Self {
        self.cpu_count = cpu_count.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Pool size used for a batch of `url_count` distinct URLs
    pub fn workers_for(&self, url_count: usize) -> usize {
        effective_workers(self.max_workers, url_count, self.cpu_count)
    }

    /// Runs every task to completion
    pub async fn dispatch(&self, tasks: Vec<ExtractionTask>) -> Vec<ExtractionResult> {
        self.dispatch_until(tasks, std::future::pending::<()>()).await
    }

    /// Runs the batch until it finishes or `cancel` resolves
    ///
    /// On cancellation outstanding tasks are aborted (which kills their
    /// worker processes) and their URLs come back as failed results.
    ///
    /// # Returns
    ///
    /// One result per distinct task URL, in first-seen order.
    pub async fn dispatch_until<C>(&self, tasks: Vec<ExtractionTask>, cancel: C) -> Vec<ExtractionResult>
    where
        C: Future<Output = ()>,
    {
        let tasks = dedup_by_url(tasks);
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let urls: Vec<String> = tasks.iter().map(|task| task.url.clone()).collect();
        let mut finished: HashMap<String, ExtractionResult> = HashMap::with_capacity(total);
        tokio::pin!(cancel);

        if total <= SEQUENTIAL_BATCH_LIMIT {
            info!("Extracting {} URLs sequentially", total);
            for task in tasks {
                tokio::select! {
                    result = run_guarded(Arc::clone(&self.runner), task) => {
                        self.record(&mut finished, result, total);
                    }
                    _ = &mut cancel => {
                        warn!("Extraction cancelled");
                        break;
                    }
                }
            }
        } else {
            let workers = self.workers_for(total).max(1);
            info!("Extracting {} URLs with {} workers", total, workers);

            let semaphore = Arc::new(Semaphore::new(workers));
            let mut pool = JoinSet::new();
            for task in tasks {
                let runner = Arc::clone(&self.runner);
                let semaphore = Arc::clone(&semaphore);
                pool.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    run_guarded(runner, task).await
                });
            }

            loop {
                tokio::select! {
                    joined = pool.join_next() => match joined {
                        Some(Ok(result)) => self.record(&mut finished, result, total),
                        Some(Err(e)) => warn!("Extraction task aborted: {}", e),
                        None => break,
                    },
                    _ = &mut cancel => {
                        warn!("Extraction cancelled, stopping {} outstanding tasks", pool.len());
                        pool.abort_all();
                        while let Some(joined) = pool.join_next().await {
                            if let Ok(result) = joined {
                                self.record(&mut finished, result, total);
                            }
                        }
                        break;
                    }
                }
            }
        }

        urls.into_iter()
            .map(|url| {
                finished
                    .remove(&url)
                    .unwrap_or_else(|| ExtractionResult::failed(&url, "extraction did not complete"))
            })
            .collect()
    }

    /// Runs one task through the same runner and safeguards as a batch
    pub async fn run_single(&self, task: ExtractionTask) -> ExtractionResult {
        run_guarded(Arc::clone(&self.runner), task).await
    }

    fn record(&self, finished: &mut HashMap<String, ExtractionResult>, result: ExtractionResult, total: usize) {
        if self.show_progress {
            info!(
                "Extraction progress {}/{}: {} {}",
                finished.len() + 1,
                total,
                result.url,
                result.describe()
            );
        }
        finished.insert(result.url.clone(), result);
    }
}

/// Runs a task with a deadline, turning every failure into a failed result
async fn run_guarded(runner: Arc<dyn TaskRunner>, task: ExtractionTask) -> ExtractionResult {
    let url = task.url.clone();
    let deadline = task.deadline();
    let attempt = AssertUnwindSafe(runner.run(task)).catch_unwind();

    match tokio::time::timeout(deadline, attempt).await {
        Ok(Ok(Ok(result))) => ExtractionResult { url, ..result },
        Ok(Ok(Err(e))) => {
            warn!("Extraction of {} failed: {}", url, e);
            ExtractionResult::failed(url, e.to_string())
        }
        Ok(Err(_)) => {
            warn!("Extraction of {} panicked", url);
            ExtractionResult::failed(url, "extraction panicked")
        }
        Err(_) => {
            warn!("Extraction of {} exceeded its deadline of {:?}", url, deadline);
            ExtractionResult::failed(url, format!("timed out after {:?}", deadline))
        }
    }
}

fn dedup_by_url(tasks: Vec<ExtractionTask>) -> Vec<ExtractionTask> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.url.clone()))
        .collect()
}
