//! Run log: many producers, one consumer.
//!
//! Every component gets a [`LogHandle`] (a cloned channel sender plus a
//! source tag) explicitly; there is no global logger. A single
//! [`LogAggregator`] thread owns the receiving end and is the only writer of
//! the log file, so lines never interleave mid-write.

use chrono::{DateTime, Local};
use colored::Colorize;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::Deserialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            source: source.into(),
            message: message.into(),
        }
    }

    /// `[<timestamp>] <message>`, the on-disk format.
    pub fn file_line(&self) -> String {
        format!("[{}] {}", self.timestamp.format(TIMESTAMP_FORMAT), self.message)
    }

    pub fn console_line(&self) -> String {
        let level = match self.level {
            LogLevel::Debug => self.level.as_str().dimmed(),
            LogLevel::Info => self.level.as_str().green(),
            LogLevel::Warn => self.level.as_str().yellow(),
            LogLevel::Error => self.level.as_str().red().bold(),
        };
        format!(
            "[{}] {:>5} {} {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            level,
            format!("{}:", self.source).cyan(),
            self.message
        )
    }
}

// =============================================================================
// Producer side
// =============================================================================

#[derive(Debug, Clone)]
pub struct LogHandle {
    tx: Sender<LogEntry>,
    source: String,
    min_level: LogLevel,
}

impl LogHandle {
    pub fn new(tx: Sender<LogEntry>, source: impl Into<String>, min_level: LogLevel) -> Self {
        Self {
            tx,
            source: source.into(),
            min_level,
        }
    }

    /// Same queue, different source tag.
    pub fn with_source(&self, source: impl Into<String>) -> Self {
        Self {
            tx: self.tx.clone(),
            source: source.into(),
            min_level: self.min_level,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if !self.enabled(level) {
            return;
        }
        // A closed queue means the run is already shutting down.
        let _ = self.tx.send(LogEntry::new(level, self.source.clone(), message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

// =============================================================================
// Consumer side
// =============================================================================

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub path: PathBuf,
    pub echo_to_console: bool,
    pub poll_interval: Duration,
    pub min_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub written: usize,
    pub file_errors: usize,
}

struct LogSink {
    file: Option<BufWriter<File>>,
    console: Option<Box<dyn Write + Send>>,
}

impl LogSink {
    fn open(path: &Path, echo_to_console: bool) -> Self {
        let file = match OpenOptions::new().append(true).create(true).open(path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(err) => {
                eprintln!(
                    "{} cannot open log file {}: {err}; logging to console only",
                    "error:".red().bold(),
                    path.display()
                );
                None
            }
        };
        let console: Option<Box<dyn Write + Send>> = if echo_to_console {
            Some(Box::new(io::stdout()))
        } else {
            None
        };
        Self { file, console }
    }

    fn write(&mut self, entry: &LogEntry, stats: &mut AggregatorStats) {
        // A closed stdout (`matmul | head`) must not cost us the file.
        if let Some(console) = self.console.as_mut() {
            let _ = writeln!(console, "{}", entry.console_line());
        }
        if let Some(file) = self.file.as_mut() {
            let result = writeln!(file, "{}", entry.file_line()).and_then(|_| file.flush());
            if result.is_err() {
                stats.file_errors += 1;
            }
        }
        stats.written += 1;
    }
}

/// The single consumer of the log queue.
///
/// Drains until the stop signal is raised *and* the queue is observed empty,
/// so everything sent before [`LogAggregator::shutdown`] is written.
pub struct LogAggregator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<AggregatorStats>>,
}

impl LogAggregator {
    /// Starts the consumer thread and returns it with a producer handle
    /// tagged `source`.
    pub fn spawn(config: AggregatorConfig, source: &str) -> io::Result<(Self, LogHandle)> {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let sink = LogSink::open(&config.path, config.echo_to_console);

        let thread_stop = Arc::clone(&stop);
        let poll_interval = config.poll_interval;
        let handle = thread::Builder::new()
            .name("log-aggregator".to_string())
            .spawn(move || drain(rx, thread_stop, sink, poll_interval))?;

        let aggregator = Self {
            stop,
            handle: Some(handle),
        };
        Ok((aggregator, LogHandle::new(tx, source, config.min_level)))
    }

    /// Raises the stop signal and waits for the queue to be drained.
    pub fn shutdown(mut self) -> AggregatorStats {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> AggregatorStats {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                eprintln!("{} log aggregator panicked", "error:".red().bold());
                AggregatorStats::default()
            }),
            None => AggregatorStats::default(),
        }
    }
}

impl Drop for LogAggregator {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_and_join();
        }
    }
}

fn drain(
    rx: Receiver<LogEntry>,
    stop: Arc<AtomicBool>,
    mut sink: LogSink,
    poll_interval: Duration,
) -> AggregatorStats {
    let mut stats = AggregatorStats::default();
    while !stop.load(Ordering::Acquire) || !rx.is_empty() {
        match rx.recv_timeout(poll_interval) {
            Ok(entry) => sink.write(&entry, &mut stats),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn quiet_config(path: PathBuf) -> AggregatorConfig {
        AggregatorConfig {
            path,
            echo_to_console: false,
            poll_interval: Duration::from_millis(10),
            min_level: LogLevel::Debug,
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_file_line_format() {
        let entry = LogEntry::new(LogLevel::Info, "worker-0", "Worker 0 finished rows 0-1");
        let line = entry.file_line();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] Worker 0 finished rows 0-1"));
        // [YYYY-MM-DD HH:MM:SS.mmm]
        assert_eq!(line.find(']'), Some(24));
    }

    #[test]
    fn test_handle_filters_below_min_level() {
        let (tx, rx) = unbounded();
        let log = LogHandle::new(tx, "test", LogLevel::Warn);
        log.debug("hidden");
        log.info("hidden");
        log.warn("shown");
        log.error("shown");
        let received: Vec<LogEntry> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|entry| entry.level >= LogLevel::Warn));
    }

    #[test]
    fn test_with_source_shares_queue() {
        let (tx, rx) = unbounded();
        let log = LogHandle::new(tx, "coordinator", LogLevel::Info);
        let worker_log = log.with_source("worker-3");
        worker_log.info("hello");
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.source, "worker-3");
        assert_eq!(log.source(), "coordinator");
    }

    #[test]
    fn test_send_after_shutdown_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let (aggregator, log) =
            LogAggregator::spawn(quiet_config(dir.path().join("run.log")), "test").unwrap();
        aggregator.shutdown();
        log.info("late entry");
    }

    #[test]
    fn test_no_loss_no_duplication_across_producers() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 250;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        let (aggregator, log) = LogAggregator::spawn(quiet_config(path.clone()), "test").unwrap();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let log = log.with_source(format!("producer-{p}"));
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        log.info(format!("entry p{p} i{i}"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let stats = aggregator.shutdown();
        assert_eq!(stats.written, PRODUCERS * PER_PRODUCER);
        assert_eq!(stats.file_errors, 0);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), PRODUCERS * PER_PRODUCER);
        for p in 0..PRODUCERS {
            for i in 0..PER_PRODUCER {
                let needle = format!("] entry p{p} i{i}");
                let count = lines.iter().filter(|line| line.ends_with(&needle)).count();
                assert_eq!(count, 1, "expected exactly one '{needle}'");
            }
        }
    }

    #[test]
    fn test_per_producer_order_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        let (aggregator, log) = LogAggregator::spawn(quiet_config(path.clone()), "test").unwrap();
        for i in 0..50 {
            log.info(format!("seq {i}"));
        }
        aggregator.shutdown();

        let content = fs::read_to_string(&path).unwrap();
        let seen: Vec<usize> = content
            .lines()
            .filter_map(|line| line.rsplit("seq ").next())
            .filter_map(|n| n.parse().ok())
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_appends_to_existing_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "[earlier] previous run\n").unwrap();

        let (aggregator, log) = LogAggregator::spawn(quiet_config(path.clone()), "test").unwrap();
        log.info("this run");
        aggregator.shutdown();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[earlier] previous run\n"));
        assert!(content.lines().last().unwrap().ends_with("] this run"));
    }

    #[test]
    fn test_unopenable_file_falls_back_to_console() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("run.log");
        let (aggregator, log) = LogAggregator::spawn(quiet_config(path.clone()), "test").unwrap();
        log.info("still counted");
        let stats = aggregator.shutdown();
        assert_eq!(stats.written, 1);
        assert!(!path.exists());
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_closed_console_keeps_file_logging() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        let sink = LogSink {
            file: Some(BufWriter::new(File::create(&path).unwrap())),
            console: Some(Box::new(ClosedPipe)),
        };

        let (tx, rx) = unbounded();
        let log = LogHandle::new(tx, "test", LogLevel::Debug);
        log.info("first");
        log.info("second");
        drop(log);

        let stats = drain(rx, Arc::new(AtomicBool::new(true)), sink, Duration::from_millis(10));
        assert_eq!(stats.written, 2);
        assert_eq!(stats.file_errors, 0);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().last().unwrap().ends_with("] second"));
    }

    #[test]
    fn test_drop_drains_queue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        {
            let (_aggregator, log) =
                LogAggregator::spawn(quiet_config(path.clone()), "test").unwrap();
            log.info("written on drop");
        }
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("written on drop"));
    }
}
