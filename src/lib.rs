//! # Parallel Matrix Multiplication
//!
//! Multiplies two randomly generated integer matrices by splitting the rows
//! of the left operand across worker threads.
//!
//! ## Pieces
//!
//! 1. **Load sampling** (`load`) - bounds the worker count by current CPU load
//! 2. **Partitioning** (`partition`) - contiguous row shards, remainder to the last
//! 3. **Workers** (`worker`) - one per shard, checkpointing through savers
//! 4. **Savers** (`saver`) - write frozen snapshots of partial progress
//! 5. **Assembly** (`assemble`) - rebuilds the product in any arrival order
//! 6. **Run log** (`log`) - many producers, one aggregator thread, one file
//! 7. **Coordination** (`coordinator`) - ties the above together
//!
//! ## Output files
//!
//! - `partial_result_proc<worker>_thread<saver>.txt`
//! - `final_result.txt`
//! - `matrix_multiplication.log`
//!
//! ## Key Dependencies
//!
//! - `crossbeam` - result and log channels
//! - `thiserror` - the `MatmulError` type
//! - `serde` + `toml` - optional settings file
//! - `sysinfo` + `num_cpus` - host load
//! - `chrono` + `colored` - log timestamps and console output

pub mod assemble;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod load;
pub mod log;
pub mod matrix;
pub mod partition;
pub mod prompt;
pub mod saver;
pub mod worker;

pub use config::Settings;
pub use coordinator::{Coordinator, MatmulRequest, RunReport};
pub use error::{MatmulError, Result};
pub use matrix::Matrix;
