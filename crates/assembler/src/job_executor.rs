//! Batch executor for the M4B assembler
//!
//! Runs jobs one after another, each on a blocking thread, and reports
//! progress through an [`EventSink`]. A failed job is recorded and the batch
//! moves on to the next one.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::assemble::{assemble_job, AssembleOptions};
use crate::jobs::Job;
use crate::tool::Toolchain;

/// Result of one job within a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { output_path: PathBuf },
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// Notifications emitted while a batch runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Emitted before each job (and once more at 100 when done)
    Progress {
        percent: u8,
        job_index: usize,
        total: usize,
    },
    /// Human-readable progress line for one job
    Log { job_id: String, message: String },
    /// A job finished, one way or the other
    JobFinished {
        job_id: String,
        name: String,
        outcome: JobOutcome,
    },
    /// Final counts, emitted once after the last job
    Summary {
        total: usize,
        succeeded: usize,
        failed: usize,
    },
}

/// Where batch events go. A disabled sink drops everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<BatchEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<BatchEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink plus the receiver the caller reads events from.
    pub fn channel() -> (Self, UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is listening anymore.
            let _ = tx.send(event);
        }
    }

    pub fn log(&self, job_id: &str, message: String) {
        self.emit(BatchEvent::Log {
            job_id: job_id.to_string(),
            message,
        });
    }
}

/// Batch run state: Idle -> Running(job_index) -> Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running { job_index: usize },
    Completed,
}

impl BatchState {
    pub fn as_str(&self) -> &str {
        match self {
            BatchState::Idle => "idle",
            BatchState::Running { .. } => "running",
            BatchState::Completed => "completed",
        }
    }
}

/// Per-job record kept in the summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub name: String,
    pub outcome: JobOutcome,
}

/// What a finished batch did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Percentage of the batch done before job `index` starts, rounded.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let index = index.min(total);
    ((index * 100 + total / 2) / total) as u8
}

/// Sequential executor for a batch of assembly jobs
pub struct BatchExecutor {
    tools: Toolchain,
    options: AssembleOptions,
    events: EventSink,
    state: Arc<RwLock<BatchState>>,
}

impl BatchExecutor {
    pub fn new(tools: Toolchain, options: AssembleOptions, events: EventSink) -> Self {
        Self {
            tools,
            options,
            events,
            state: Arc::new(RwLock::new(BatchState::Idle)),
        }
    }

    /// Current state of the batch
    pub async fn state(&self) -> BatchState {
        *self.state.read().await
    }

    /// Handle for observing the state from elsewhere
    pub fn shared_state(&self) -> Arc<RwLock<BatchState>> {
        Arc::clone(&self.state)
    }

    /// Run every job in order and return the aggregate result.
    ///
    /// Only one job is in flight at a time. Each job's blocking pipeline runs
    /// on the blocking thread pool; a failure (or panic) in one job never
    /// stops the jobs after it.
    pub async fn run(&self, jobs: Vec<Job>) -> BatchSummary {
        let total = jobs.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        info!(jobs = total, "starting batch");

        for (index, job) in jobs.into_iter().enumerate() {
            *self.state.write().await = BatchState::Running { job_index: index };
            self.events.emit(BatchEvent::Progress {
                percent: progress_percent(index, total),
                job_index: index,
                total,
            });
            self.events.log(
                &job.id,
                format!("Processing job {}/{}: {}", index + 1, total, job.name),
            );

            let outcome = self.execute(&job).await;
            match &outcome {
                JobOutcome::Succeeded { output_path } => {
                    summary.succeeded += 1;
                    info!(job = %job.id, name = %job.name, "job completed");
                    self.events.log(
                        &job.id,
                        format!("Created {}", output_path.display()),
                    );
                }
                JobOutcome::Failed { error: detail } => {
                    summary.failed += 1;
                    error!(job = %job.id, name = %job.name, error = %detail, "job failed");
                    self.events
                        .log(&job.id, format!("Error in {}: {}", job.name, detail));
                }
            }

            self.events.emit(BatchEvent::JobFinished {
                job_id: job.id.clone(),
                name: job.name.clone(),
                outcome: outcome.clone(),
            });
            summary.results.push(JobResult {
                job_id: job.id,
                name: job.name,
                outcome,
            });
        }

        self.events.emit(BatchEvent::Progress {
            percent: 100,
            job_index: total,
            total,
        });
        self.events.emit(BatchEvent::Summary {
            total,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });
        *self.state.write().await = BatchState::Completed;
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch finished"
        );

        summary
    }

    /// Assemble one job on the blocking pool.
    async fn execute(&self, job: &Job) -> JobOutcome {
        let job = job.clone();
        let tools = self.tools.clone();
        let options = self.options.clone();
        let events = self.events.clone();

        let result = tokio::task::spawn_blocking(move || {
            assemble_job(&job, &job.output_path, &options, &tools, &events)
        })
        .await;

        match result {
            Ok(Ok(report)) => JobOutcome::Succeeded {
                output_path: report.output_path,
            },
            Ok(Err(e)) => JobOutcome::Failed {
                error: e.to_string(),
            },
            Err(join_error) => JobOutcome::Failed {
                error: format!("job panicked: {}", join_error),
            },
        }
    }
}
