//! Bounded worker pool for background rasterization
//!
//! Worker threads pull jobs from a shared FIFO queue and run them through
//! an executor callback. There is no job-level cancellation: render
//! staleness is detected by the pipeline's own validity checks, and
//! wasted work is bounded by the pool size.

mod worker;

pub use worker::{JobExecutor, WorkerPool, WorkerPoolConfig};
