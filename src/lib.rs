//! # ticketq
//!
//! A small SQLite-backed job queue with fixed-window rate limiting,
//! content-based submission dedup, and a single fairness-aware dispatcher.
//!
//! Submissions flow through [`engine::Intake`]; one [`engine::Dispatcher`]
//! picks the least recently served submitter's oldest job, claims it, and
//! runs it through an [`engine::Executor`].

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod limiter;
pub mod model;
pub mod scheduler;
pub mod telemetry;
