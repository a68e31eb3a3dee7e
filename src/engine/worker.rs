// Bounded job queue driving the wrap pipeline.
//
// One worker thread per running job. The queue, the id -> state
// registry and the running-job map all live behind a single mutex,
// which is the only place job state is ever mutated; pipelines just
// emit events.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

use super::core::{
    CancelToken, JobEvent, JobSpec, JobState, JobStatus, PipelineError, PipelineResult, run_job,
};
use super::env::BinaryEnvironment;

struct RunningJob {
    token: CancelToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct EngineInner {
    queue: VecDeque<JobSpec>,
    jobs: HashMap<Uuid, JobState>,
    running: HashMap<Uuid, RunningJob>,
}

struct EngineShared {
    env: Arc<BinaryEnvironment>,
    max_workers: usize,
    inner: Mutex<EngineInner>,
    tx: Sender<JobEvent>,
}

/// FIFO queue of wrap jobs with bounded concurrency (default 1).
pub struct JobEngine {
    shared: Arc<EngineShared>,
    rx: Receiver<JobEvent>,
}

impl JobEngine {
    pub fn new(env: Arc<BinaryEnvironment>) -> Self {
        Self::with_workers(env, 1)
    }

    pub fn with_workers(env: Arc<BinaryEnvironment>, max_workers: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            shared: Arc::new(EngineShared {
                env,
                max_workers: max_workers.max(1),
                inner: Mutex::new(EngineInner::default()),
                tx,
            }),
            rx,
        }
    }

    /// Receiver for the per-job event stream.
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.rx
    }

    /// Validate and enqueue a job, then drain the queue. Returns the
    /// job id. Rejected jobs never reach any external invocation.
    pub fn submit(&self, spec: JobSpec) -> PipelineResult<Uuid> {
        if !spec.has_images() {
            return Err(PipelineError::InvalidJob(
                "at least one of start/end image is required".to_string(),
            ));
        }

        let job_id = spec.id;
        {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner
                .jobs
                .get(&job_id)
                .is_some_and(|state| !state.status.is_terminal())
            {
                return Err(PipelineError::InvalidJob(format!(
                    "job {job_id} is already queued or running"
                )));
            }
            inner.jobs.insert(job_id, JobState::queued());
            inner.queue.push_back(spec);
        }
        debug!(job = %job_id, "job queued");

        EngineShared::drain(&self.shared);
        Ok(job_id)
    }

    /// Cancel a job. A queued job is removed without ever starting; a
    /// running job has its external process killed, and this call
    /// blocks until the worker has stopped. Returns false for unknown
    /// or already-terminal jobs.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let handle = {
            let mut inner = self.shared.inner.lock().unwrap();

            if let Some(pos) = inner.queue.iter().position(|spec| spec.id == job_id) {
                inner.queue.remove(pos);
                EngineShared::set_terminal(
                    &mut inner,
                    job_id,
                    JobStatus::Cancelled,
                    "Cancelled",
                    None,
                    None,
                );
                let _ = self.shared.tx.send(JobEvent::Cancelled { job_id });
                return true;
            }

            match inner.running.remove(&job_id) {
                Some(running) => {
                    running.token.cancel();
                    if let Some(state) = inner.jobs.get_mut(&job_id) {
                        state.message = "Cancelling".to_string();
                    }
                    running.handle
                }
                None => return false,
            }
        };

        // The worker observes the cancelled token, marks the job and
        // re-drains; wait for it so the terminal state is visible on
        // return.
        if handle.join().is_err() {
            warn!(job = %job_id, "cancelled worker panicked");
        }
        true
    }

    /// Read snapshot of one job's state.
    pub fn job_state(&self, job_id: Uuid) -> Option<JobState> {
        self.shared.inner.lock().unwrap().jobs.get(&job_id).cloned()
    }

    /// Read snapshot of every known job.
    pub fn snapshot(&self) -> Vec<(Uuid, JobState)> {
        self.shared
            .inner
            .lock()
            .unwrap()
            .jobs
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.shared.inner.lock().unwrap().running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.shared.inner.lock().unwrap().queue.len()
    }
}

impl EngineShared {
    /// Start queued jobs while worker slots are free. Pop and insert
    /// happen under the lock, so concurrent drains (from submission,
    /// completion, cancellation) can never double-start a job.
    fn drain(shared: &Arc<EngineShared>) {
        loop {
            let mut inner = shared.inner.lock().unwrap();
            if inner.running.len() >= shared.max_workers {
                return;
            }
            let Some(spec) = inner.queue.pop_front() else {
                return;
            };

            let job_id = spec.id;
            if let Some(state) = inner.jobs.get_mut(&job_id) {
                state.status = JobStatus::Running;
                state.message = "Starting".to_string();
            }

            let token = CancelToken::new();
            let handle = Self::spawn_worker(shared, spec, token.clone());
            inner.running.insert(job_id, RunningJob { token, handle });
            debug!(job = %job_id, "job started");
        }
    }

    fn spawn_worker(shared: &Arc<EngineShared>, spec: JobSpec, token: CancelToken) -> JoinHandle<()> {
        let shared = Arc::clone(shared);
        thread::spawn(move || {
            let job_id = spec.id;
            let _ = shared.tx.send(JobEvent::Started { job_id });

            let mut result = {
                let sink = Arc::clone(&shared);
                run_job(&shared.env, &spec, &token, move |event| {
                    sink.apply_event(&event);
                    let _ = sink.tx.send(event);
                })
            };

            // A cancel that lands as the pipeline finishes still wins:
            // a cancelled job never reports Done.
            if token.is_cancelled() {
                result = Err(PipelineError::Cancelled);
            }

            let mut inner = shared.inner.lock().unwrap();
            match result {
                Ok(output_path) => {
                    Self::set_terminal(
                        &mut inner,
                        job_id,
                        JobStatus::Done,
                        "Completed",
                        Some(output_path.clone()),
                        None,
                    );
                    let _ = shared.tx.send(JobEvent::Finished {
                        job_id,
                        output_path,
                    });
                }
                Err(PipelineError::Cancelled) => {
                    Self::set_terminal(
                        &mut inner,
                        job_id,
                        JobStatus::Cancelled,
                        "Cancelled",
                        None,
                        None,
                    );
                    let _ = shared.tx.send(JobEvent::Cancelled { job_id });
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(job = %job_id, "job failed: {error}");
                    Self::set_terminal(
                        &mut inner,
                        job_id,
                        JobStatus::Error,
                        "Failed",
                        None,
                        Some(error.clone()),
                    );
                    let _ = shared.tx.send(JobEvent::Failed { job_id, error });
                }
            }
            inner.running.remove(&job_id);
            drop(inner);

            Self::drain(&shared);
        })
    }

    /// Fold a pipeline event into the registry. Progress is clamped
    /// monotonic and terminal states are never overwritten.
    fn apply_event(&self, event: &JobEvent) {
        let mut inner = self.inner.lock().unwrap();
        let Some(state) = inner.jobs.get_mut(&event.job_id()) else {
            return;
        };
        if state.status.is_terminal() {
            return;
        }

        match event {
            JobEvent::Progress { pct, .. } => {
                state.progress_pct = state.progress_pct.max(pct.clamp(0.0, 100.0));
            }
            JobEvent::Status { message, .. } => {
                state.message = message.clone();
            }
            _ => {}
        }
    }

    fn set_terminal(
        inner: &mut EngineInner,
        job_id: Uuid,
        status: JobStatus,
        message: &str,
        output_path: Option<std::path::PathBuf>,
        error: Option<String>,
    ) {
        let Some(state) = inner.jobs.get_mut(&job_id) else {
            return;
        };
        if state.status.is_terminal() {
            return;
        }

        state.status = status;
        state.message = message.to_string();
        if status == JobStatus::Done {
            state.progress_pct = 100.0;
        }
        state.output_path = output_path;
        state.error = error;
    }
}
