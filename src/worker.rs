//! One worker per shard.
//!
//! A worker walks `Idle -> Computing -> Draining -> Reporting -> Terminated`.
//! While computing it hands frozen copies of its progress to savers; before
//! reporting it joins every saver it started, so a finished worker never
//! leaves a checkpoint half-written.

use crate::error::{MatmulError, Result};
use crate::log::LogHandle;
use crate::matrix::{Matrix, Row};
use crate::partition::Shard;
use crate::saver::{partial_file_name, Saver, SaverSet};
use crossbeam::channel::Sender;
use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A worker's finished shard. Moved to the coordinator exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialResult {
    pub worker_id: usize,
    pub start_row: usize,
    pub end_row: usize,
    pub rows: Vec<Row>,
}

#[derive(Debug)]
pub enum WorkerReport {
    Completed(PartialResult),
    Failed { worker_id: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Computing,
    Draining,
    Reporting,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Computing => "computing",
            WorkerState::Draining => "draining",
            WorkerState::Reporting => "reporting",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Where and how often a worker checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    pub output_dir: PathBuf,
    pub prefix: String,
    pub checkpoints_per_shard: usize,
}

impl CheckpointPolicy {
    /// Rows between checkpoints: `max(1, shard_len / checkpoints_per_shard)`.
    pub fn interval(&self, shard_len: usize) -> usize {
        (shard_len / self.checkpoints_per_shard.max(1)).max(1)
    }

    /// The first row of a shard always checkpoints, so even a one-row shard
    /// leaves a file behind.
    pub fn is_due(&self, rows_done_before: usize, shard_len: usize) -> bool {
        rows_done_before % self.interval(shard_len) == 0
    }

    pub fn path(&self, worker_id: usize, saver_index: usize) -> PathBuf {
        self.output_dir
            .join(partial_file_name(&self.prefix, worker_id, saver_index))
    }
}

pub struct Worker {
    shard: Shard,
    a: Arc<Matrix>,
    b: Arc<Matrix>,
    checkpoints: CheckpointPolicy,
    log: LogHandle,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        shard: Shard,
        a: Arc<Matrix>,
        b: Arc<Matrix>,
        checkpoints: CheckpointPolicy,
        log: &LogHandle,
    ) -> Self {
        let log = log.with_source(format!("worker-{}", shard.worker_id));
        Self {
            shard,
            a,
            b,
            checkpoints,
            log,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn spawn(self, results: Sender<WorkerReport>) -> io::Result<JoinHandle<WorkerState>> {
        thread::Builder::new()
            .name(format!("worker-{}", self.shard.worker_id))
            .spawn(move || self.run(&results))
    }

    /// Computes the shard, waits for its savers, then sends exactly one
    /// report. Never panics out: failures become [`WorkerReport::Failed`].
    pub fn run(mut self, results: &Sender<WorkerReport>) -> WorkerState {
        let worker_id = self.shard.worker_id;
        self.transition(WorkerState::Computing);

        let mut savers = SaverSet::new(self.log.clone());
        let computed = panic::catch_unwind(AssertUnwindSafe(|| self.compute(&mut savers)));

        self.transition(WorkerState::Draining);
        let summary = savers.join_all();
        self.log.debug(format!(
            "Worker {worker_id}: {} of {} checkpoints written",
            summary.succeeded, summary.spawned
        ));

        self.transition(WorkerState::Reporting);
        let report = match computed {
            Ok(Ok(rows)) => WorkerReport::Completed(PartialResult {
                worker_id,
                start_row: self.shard.start_row,
                end_row: self.shard.end_row,
                rows,
            }),
            Ok(Err(err)) => WorkerReport::Failed {
                worker_id,
                reason: err.to_string(),
            },
            Err(payload) => WorkerReport::Failed {
                worker_id,
                reason: format!("panicked: {}", panic_message(payload.as_ref())),
            },
        };

        let completed = matches!(report, WorkerReport::Completed(_));
        if let WorkerReport::Failed { reason, .. } = &report {
            self.log.error(format!("Worker {worker_id} failed: {reason}"));
        }
        if results.send(report).is_err() {
            self.log.warn(format!(
                "Worker {worker_id}: coordinator stopped listening, result discarded"
            ));
        } else if completed {
            self.log.info(format!(
                "Worker {worker_id} finished rows {}-{}",
                self.shard.start_row,
                self.shard.end_row.saturating_sub(1)
            ));
        }

        self.transition(WorkerState::Terminated);
        self.state
    }

    fn compute(&self, savers: &mut SaverSet) -> Result<Vec<Row>> {
        self.a.check_multipliable(&self.b)?;
        if self.shard.end_row > self.a.rows() || self.shard.start_row > self.shard.end_row {
            return Err(MatmulError::ShardOutOfBounds {
                start: self.shard.start_row,
                end: self.shard.end_row,
                total: self.a.rows(),
            });
        }

        let shard_len = self.shard.len();
        let mut rows: Vec<Row> = Vec::with_capacity(shard_len);
        for i in self.shard.rows() {
            let due = self.checkpoints.is_due(rows.len(), shard_len);
            rows.push(self.a.product_row(i, &self.b)?);
            if due {
                let index = savers.len();
                // Savers get their own copy; `rows` keeps growing here.
                let snapshot = rows.clone();
                savers.start(Saver::new(
                    self.shard.worker_id,
                    index,
                    self.checkpoints.path(self.shard.worker_id, index),
                    snapshot,
                    self.log.clone(),
                ));
            }
        }
        Ok(rows)
    }

    fn transition(&mut self, next: WorkerState) {
        self.log.debug(format!(
            "Worker {}: {} -> {}",
            self.shard.worker_id, self.state, next
        ));
        self.state = next;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
