//! LLM Swarm
//!
//! Resilient batch orchestration across a swarm of LLM providers:
//! - Per-provider circuit breakers with cooldown and trial calls
//! - Bounded concurrency with retry, backoff and batch deadlines
//! - Temporal synchronization verdicts and per-call quality flags
//! - Background health probing and threshold-based monitoring

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod orchestrator;

pub use config::AppConfig;
pub use domain::{BatchReport, CallSpec, ProviderKey, SwarmError};
pub use orchestrator::Orchestrator;
