//! atmsw-plan - ATM switch dry-run planner
//!
//! Loads a switch configuration and prints the hypervisor commands that
//! would build it, one per line.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dynamips_atmsw::{plan, AtmSwitchConfig, DEFAULT_PLAN_ADDRESS};

/// Dynamips ATM switch command planner
#[derive(Parser, Debug)]
#[command(name = "atmsw-plan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Switch configuration file (JSON)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Hypervisor address reported in logs
    #[arg(short = 'a', long, default_value = DEFAULT_PLAN_ADDRESS)]
    address: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

async fn run(args: &Args) -> anyhow::Result<Vec<String>> {
    let config = AtmSwitchConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!(
        "Planning ATM switch \"{}\" on {}",
        config.name, args.address
    );

    let commands = plan(&config, &args.address)
        .await
        .with_context(|| format!("planning ATM switch \"{}\"", config.name))?;
    Ok(commands)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(&args).await {
        Ok(commands) => {
            for command in commands {
                println!("{}", command);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("atmsw-plan failed: {:#}", e);
            eprintln!("atmsw-plan: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
