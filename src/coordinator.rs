//! Run orchestration.
//!
//! A [`Coordinator`] owns the run's log aggregator from [`Coordinator::start`]
//! to [`Coordinator::shutdown`]. In between, [`Coordinator::multiply`] splits
//! the rows of A into shards, runs one worker thread per shard, drains exactly
//! one report per worker (each receive bounded by the configured timeout),
//! joins the workers and reassembles the product.

use crate::assemble::ResultAssembler;
use crate::config::Settings;
use crate::error::{MatmulError, Result};
use crate::load::{LoadProbe, LoadSnapshot};
use crate::log::{AggregatorConfig, AggregatorStats, LogAggregator, LogHandle};
use crate::matrix::{Matrix, MatrixGenerator};
use crate::partition::{partition, Shard};
use crate::worker::{CheckpointPolicy, Worker, WorkerReport, WorkerState};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Shapes of the two input matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatmulRequest {
    pub a_rows: usize,
    pub a_cols: usize,
    pub b_rows: usize,
    pub b_cols: usize,
}

impl MatmulRequest {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("rows of A", self.a_rows),
            ("columns of A", self.a_cols),
            ("rows of B", self.b_rows),
            ("columns of B", self.b_cols),
        ] {
            if value == 0 {
                return Err(MatmulError::InvalidDimension { name, value });
            }
        }
        if self.a_cols != self.b_rows {
            return Err(MatmulError::DimensionMismatch {
                a_rows: self.a_rows,
                a_cols: self.a_cols,
                b_rows: self.b_rows,
                b_cols: self.b_cols,
            });
        }
        Ok(())
    }
}

/// Checks `1 <= requested <= max`.
pub fn validate_worker_count(requested: usize, max: usize) -> Result<usize> {
    if requested == 0 || requested > max {
        return Err(MatmulError::WorkerCountOutOfRange { requested, max });
    }
    Ok(requested)
}

#[derive(Debug)]
pub struct Multiplication {
    pub result: Matrix,
    pub shards: Vec<Shard>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct RunReport {
    pub a: Arc<Matrix>,
    pub b: Arc<Matrix>,
    pub multiplication: Multiplication,
    pub saved_to: Option<PathBuf>,
}

pub struct Coordinator {
    settings: Settings,
    log: LogHandle,
    aggregator: LogAggregator,
}

impl Coordinator {
    /// Creates the output directory and starts the log aggregator.
    pub fn start(settings: Settings) -> Result<Self> {
        settings.validate()?;
        fs::create_dir_all(&settings.output_dir)
            .map_err(|err| MatmulError::io(&settings.output_dir, err))?;

        let config = AggregatorConfig {
            path: settings.log_path(),
            echo_to_console: settings.echo_to_console,
            poll_interval: settings.log_poll_interval(),
            min_level: settings.min_level,
        };
        let (aggregator, log) = LogAggregator::spawn(config, "coordinator")
            .map_err(|err| MatmulError::io(settings.log_path(), err))?;

        log.info("Program started");
        Ok(Self {
            settings,
            log,
            aggregator,
        })
    }

    pub fn log(&self) -> &LogHandle {
        &self.log
    }

    /// Samples host load through `probe` and logs the reading.
    pub fn sample_load(&self, probe: &mut impl LoadProbe) -> LoadSnapshot {
        let snapshot = probe.sample();
        self.log.info(snapshot.to_string());
        snapshot
    }

    /// Generates both inputs, multiplies them and saves the product.
    pub fn run<R: Rng + ?Sized>(
        &self,
        request: &MatmulRequest,
        num_workers: usize,
        rng: &mut R,
    ) -> Result<RunReport> {
        request.validate()?;

        self.log.info("Generating matrices...");
        let generator = MatrixGenerator::new(self.settings.min_value, self.settings.max_value);
        let a = Arc::new(generator.generate(request.a_rows, request.a_cols, rng));
        let b = Arc::new(generator.generate(request.b_rows, request.b_cols, rng));
        if self.settings.log_matrices {
            self.log_matrix("Matrix A", &a);
            self.log_matrix("Matrix B", &b);
        }

        let multiplication = self.multiply(Arc::clone(&a), Arc::clone(&b), num_workers)?;
        if self.settings.log_matrices {
            self.log_matrix("Result matrix", &multiplication.result);
        }
        let saved_to = self.save_result(&multiplication.result);

        Ok(RunReport {
            a,
            b,
            multiplication,
            saved_to,
        })
    }

    pub fn multiply(
        &self,
        a: Arc<Matrix>,
        b: Arc<Matrix>,
        num_workers: usize,
    ) -> Result<Multiplication> {
        a.check_multipliable(&b)?;
        if num_workers == 0 {
            return Err(MatmulError::WorkerCountOutOfRange {
                requested: num_workers,
                max: a.rows(),
            });
        }
        let shards = partition(a.rows(), num_workers)?;
        if shards.len() < num_workers {
            self.log.warn(format!(
                "Requested {num_workers} workers for {} rows; using {}",
                a.rows(),
                shards.len()
            ));
        }

        self.log.info(format!(
            "Starting matrix multiplication with {} workers...",
            shards.len()
        ));
        let started = Instant::now();

        let policy = CheckpointPolicy {
            output_dir: self.settings.output_dir.clone(),
            prefix: self.settings.partial_prefix.clone(),
            checkpoints_per_shard: self.settings.checkpoints_per_shard,
        };

        let (tx, rx) = unbounded();
        let mut handles: Vec<(usize, JoinHandle<WorkerState>)> = Vec::with_capacity(shards.len());
        let mut spawn_error = None;
        for shard in &shards {
            self.log.debug(format!("Assigning {shard}"));
            let worker = Worker::new(
                *shard,
                Arc::clone(&a),
                Arc::clone(&b),
                policy.clone(),
                &self.log,
            );
            match worker.spawn(tx.clone()) {
                Ok(handle) => handles.push((shard.worker_id, handle)),
                Err(err) => {
                    spawn_error = Some(MatmulError::WorkerFailed {
                        worker_id: shard.worker_id,
                        reason: format!("could not start thread: {err}"),
                    });
                    break;
                }
            }
        }
        drop(tx);

        let assembler = ResultAssembler::new(a.rows(), b.cols());
        let drained = match spawn_error {
            Some(err) => Err(err),
            None => drain_results(&rx, handles.len(), self.settings.result_timeout(), assembler),
        };

        if matches!(drained, Err(MatmulError::WorkerTimeout { .. })) {
            self.log.warn(format!(
                "Abandoning {} worker threads without joining",
                handles.iter().filter(|(_, h)| !h.is_finished()).count()
            ));
        } else {
            self.join_workers(handles);
        }

        let result = match drained {
            Ok(result) => result,
            Err(err) => {
                self.log.error(format!("Multiplication failed: {err}"));
                return Err(err);
            }
        };

        let elapsed = started.elapsed();
        self.log.info(format!(
            "Multiplication completed in {:.4} seconds",
            elapsed.as_secs_f64()
        ));
        Ok(Multiplication {
            result,
            shards,
            elapsed,
        })
    }

    /// Writes the final matrix. Failure is logged and otherwise ignored.
    pub fn save_result(&self, result: &Matrix) -> Option<PathBuf> {
        let path = self.settings.final_result_path();
        match result.save_to_file(&path) {
            Ok(()) => {
                self.log
                    .info(format!("Final result saved to {}", path.display()));
                Some(path)
            }
            Err(err) => {
                self.log.error(format!("Error saving final result: {err}"));
                None
            }
        }
    }

    /// Stops the log aggregator once everything queued so far is written.
    pub fn shutdown(self) -> AggregatorStats {
        let Coordinator {
            log, aggregator, ..
        } = self;
        drop(log);
        aggregator.shutdown()
    }

    fn join_workers(&self, handles: Vec<(usize, JoinHandle<WorkerState>)>) {
        for (worker_id, handle) in handles {
            match handle.join() {
                Ok(state) => self
                    .log
                    .debug(format!("Worker {worker_id} joined in state {state}")),
                Err(_) => self
                    .log
                    .error(format!("Worker {worker_id} thread panicked")),
            }
        }
    }

    fn log_matrix(&self, label: &str, matrix: &Matrix) {
        self.log.info(format!(
            "{label} ({}x{}):\n{}",
            matrix.rows(),
            matrix.cols(),
            matrix.to_string().trim_end()
        ));
    }
}

/// Receives exactly `expected` reports, waiting at most `timeout` for each.
fn drain_results(
    rx: &Receiver<WorkerReport>,
    expected: usize,
    timeout: Duration,
    mut assembler: ResultAssembler,
) -> Result<Matrix> {
    for received in 0..expected {
        match rx.recv_timeout(timeout) {
            Ok(WorkerReport::Completed(partial)) => assembler.accept(partial)?,
            Ok(WorkerReport::Failed { worker_id, reason }) => {
                return Err(MatmulError::WorkerFailed { worker_id, reason });
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(MatmulError::WorkerTimeout {
                    received,
                    expected,
                    waited: timeout,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(MatmulError::IncompleteResult {
                    missing: expected - received,
                    total: expected,
                });
            }
        }
    }
    assembler.finish()
}
