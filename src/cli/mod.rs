//! CLI for the LLM swarm processor.
//!
//! Subcommands:
//! - `run`: process work items (domains) through the swarm
//! - `probe`: one health probe round against every configured provider

pub mod probe;
pub mod run;

use clap::{Parser, Subcommand};

/// LLM Swarm - resilient multi-provider batch orchestration
#[derive(Parser)]
#[command(name = "llm-swarm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process work items through every configured provider
    Run(run::RunArgs),

    /// Probe provider health once and print the results
    Probe,
}
