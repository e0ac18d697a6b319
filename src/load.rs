//! Host load sampling.
//!
//! Suggests an upper bound on worker count: logical cores minus the share
//! that is already busy. It only bounds what the user may pick; it never
//! replaces a valid explicit choice.

use std::fmt;
use std::thread;
use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSnapshot {
    pub logical_cores: usize,
    pub cpu_load_percent: f32,
    pub recommended_max_workers: usize,
}

impl LoadSnapshot {
    /// `max(1, cores - floor(cores * load / 100))`, with load clamped to
    /// `0..=100`.
    pub fn from_parts(logical_cores: usize, cpu_load_percent: f32) -> Self {
        let load = if cpu_load_percent.is_finite() {
            cpu_load_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let busy = (logical_cores as f64 * f64::from(load) / 100.0).floor() as usize;
        Self {
            logical_cores,
            cpu_load_percent: load,
            recommended_max_workers: logical_cores.saturating_sub(busy).max(1),
        }
    }
}

impl fmt::Display for LoadSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Available CPU cores: {}, CPU load: {:.1}%, Max available workers: {}",
            self.logical_cores, self.cpu_load_percent, self.recommended_max_workers
        )
    }
}

/// Source of load readings, so callers can be tested without the host.
pub trait LoadProbe {
    fn sample(&mut self) -> LoadSnapshot;
}

/// Reads the real host. Sampling blocks for sysinfo's minimum CPU update
/// interval, since a single refresh cannot produce a usage figure.
pub struct SystemLoadProbe {
    system: System,
}

impl SystemLoadProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemLoadProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProbe for SystemLoadProbe {
    fn sample(&mut self) -> LoadSnapshot {
        self.system.refresh_cpu_usage();
        thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.system.refresh_cpu_usage();
        LoadSnapshot::from_parts(num_cpus::get(), self.system.global_cpu_usage())
    }
}

/// Always returns the same reading.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad(pub LoadSnapshot);

impl LoadProbe for FixedLoad {
    fn sample(&mut self) -> LoadSnapshot {
        self.0
    }
}
