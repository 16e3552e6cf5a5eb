//! Background Tasks Module
//!
//! Contains background tasks that run periodically for each cache instance.
//!
//! # Tasks
//! - TTL Sweep: Removes expired cache entries at configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
