//! Checkpoint writers.
//!
//! A [`Saver`] owns a frozen copy of the rows a worker has computed so far
//! and writes it to its own file on a short-lived thread. Failures are logged
//! and swallowed: a missing checkpoint never aborts the run.

use crate::log::LogHandle;
use crate::matrix::{write_rows, Row};
use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

/// `<prefix>_proc<worker_id>_thread<saver_index>.txt`
pub fn partial_file_name(prefix: &str, worker_id: usize, saver_index: usize) -> String {
    format!("{prefix}_proc{worker_id}_thread{saver_index}.txt")
}

pub struct Saver {
    worker_id: usize,
    index: usize,
    path: PathBuf,
    snapshot: Vec<Row>,
    log: LogHandle,
}

impl Saver {
    pub fn new(
        worker_id: usize,
        index: usize,
        path: PathBuf,
        snapshot: Vec<Row>,
        log: LogHandle,
    ) -> Self {
        Self {
            worker_id,
            index,
            path,
            snapshot,
            log,
        }
    }

    /// Writes the snapshot and reports whether it reached disk.
    pub fn run(self) -> bool {
        match write_rows(&self.path, &self.snapshot) {
            Ok(()) => {
                self.log.info(format!(
                    "Worker {}, saver {} saved partial result ({} rows) to {}",
                    self.worker_id,
                    self.index,
                    self.snapshot.len(),
                    self.path.display()
                ));
                true
            }
            Err(err) => {
                self.log.error(format!(
                    "Error saving partial result to {}: {err}",
                    self.path.display()
                ));
                false
            }
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<bool>> {
        thread::Builder::new()
            .name(format!("worker-{}-saver-{}", self.worker_id, self.index))
            .spawn(move || self.run())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub spawned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Every saver a worker started; [`SaverSet::join_all`] is the barrier the
/// worker crosses before it may report.
pub struct SaverSet {
    handles: Vec<JoinHandle<bool>>,
    unstarted: usize,
    log: LogHandle,
}

impl SaverSet {
    pub fn new(log: LogHandle) -> Self {
        Self {
            handles: Vec::new(),
            unstarted: 0,
            log,
        }
    }

    /// Number of savers started so far, which is also the next saver index.
    pub fn len(&self) -> usize {
        self.handles.len() + self.unstarted
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts `saver` on its own thread. A saver whose thread cannot be
    /// created is logged and counted as failed.
    pub fn start(&mut self, saver: Saver) {
        let index = saver.index;
        match saver.spawn() {
            Ok(handle) => self.handles.push(handle),
            Err(err) => {
                self.log
                    .error(format!("Could not start saver thread {index}: {err}"));
                self.unstarted += 1;
            }
        }
    }

    pub fn join_all(self) -> SaveSummary {
        let mut summary = SaveSummary {
            spawned: self.unstarted,
            succeeded: 0,
            failed: self.unstarted,
        };
        for (index, handle) in self.handles.into_iter().enumerate() {
            summary.spawned += 1;
            match handle.join() {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(_) => {
                    self.log.error(format!("Saver thread {index} panicked"));
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
