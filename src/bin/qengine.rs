//! qengine CLI Binary
//!
//! Runs question modules from a local course directory.

use clap::Parser;
use qengine::cli::{Cli, RunContext};
use qengine::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("qengine starting");

    let context = match RunContext::new(cli.course.clone(), cli.course_id, cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error initializing engine: {}", e);
            eprintln!("{}", qengine::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", qengine::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Logging config from the config file, then CLI flags on top.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = RunContext::load_config(cli.config.clone())
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }
    config
}
