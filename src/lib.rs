//! Keeps a local, per-day cache of RescueTime statistics and answers questions about the
//! current day from it, without asking RescueTime again.
//!

pub mod cli;
pub mod config;
pub mod provider;
pub mod query;
pub mod storage;
pub mod sync;
pub mod utils;
