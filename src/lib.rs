//! vidforge — batch video-generation orchestrator.
//!
//! The run-execution engine: turns a validated storyboard plus a routing
//! configuration into concurrent generation jobs, fails over between
//! providers, applies an adaptive process-wide concurrency cap, polls
//! provider tasks through a create/poll/download/persist state machine,
//! classifies errors for retry policy, and atomically records task and run
//! progress.

pub mod adapters;
pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod logging;
pub mod services;
