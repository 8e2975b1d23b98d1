use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use davmirror::cli::Args;
use davmirror::config::Config;
use davmirror::connection::Endpoint;
use davmirror::dav::DavConnector;
use davmirror::journal::{Journal, JournalEntry};
use davmirror::logger::{ConsoleLogger, Level, Logger, TeeLogger, TextLogger};
use davmirror::progress::SpinnerLogger;
use davmirror::url::remote_root;
use davmirror::{Orchestrator, RunOptions, RunStatus};

const EXIT_ENVIRONMENT: u8 = 1;
const EXIT_SYNC_FAILED: u8 = 2;

fn build_logger(args: &Args) -> Result<Arc<dyn Logger>> {
    let console: Arc<dyn Logger> = Arc::new(ConsoleLogger::new(args.verbose));
    let console: Arc<dyn Logger> = if args.progress {
        Arc::new(SpinnerLogger::new(console))
    } else {
        console
    };
    match args.log_file {
        Some(ref path) => {
            let file = TextLogger::new(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Ok(Arc::new(TeeLogger::new(vec![console, Arc::new(file) as Arc<dyn Logger>])))
        }
        None => Ok(console),
    }
}

fn run(args: &Args, logger: Arc<dyn Logger>) -> u8 {
    let progname = env!("CARGO_PKG_NAME");
    let started_at = Utc::now();
    logger.event(
        Level::Info,
        &format!(
            "{} Started at {}",
            progname,
            Local::now().format("%A %F %H:%M:%S")
        ),
    );

    logger.event(
        Level::Debug,
        &format!("Loading config '{}'", args.config.display()),
    );
    let config = match Config::load_from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            logger.event(Level::Error, &e.to_string());
            return EXIT_ENVIRONMENT;
        }
    };
    logger.event(Level::Debug, &format!("Config: {:?}", config));

    let root = remote_root(&config.davstart, &args.start);
    let endpoint = Endpoint::from_config(&config, &root);
    let mut options = RunOptions::from_config(&config, &args.destdir, &root);
    options.force = args.force;

    let orchestrator = Orchestrator::new(
        DavConnector::new(config.timeout, logger.clone()),
        endpoint.clone(),
        options,
        logger.clone(),
    );
    let result = match orchestrator.run() {
        Ok(r) => r,
        // Rotation and sentinel errors happen before any network activity.
        Err(e) => {
            logger.event(Level::Error, &e.to_string());
            return EXIT_ENVIRONMENT;
        }
    };

    if let Some(ref path) = args.journal {
        let entry = JournalEntry::from_result(&result, started_at, &endpoint.display_url(), &args.destdir);
        if let Err(e) = Journal::new(path).append(&entry) {
            logger.event(Level::Warn, &format!("journal not updated: {:#}", e));
        }
    }

    logger.event(
        Level::Info,
        &format!(
            "{} Processing ended at {}",
            progname,
            Local::now().format("%A %F %H:%M:%S")
        ),
    );
    logger.event(
        Level::Info,
        &format!("Total processing time: {:.3}s", result.elapsed.as_secs_f64()),
    );

    match result.status {
        RunStatus::Succeeded | RunStatus::Skipped => 0,
        RunStatus::Failed => EXIT_SYNC_FAILED,
    }
}

fn main() -> ExitCode {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let args = Args::parse();
    let logger = match build_logger(&args) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_ENVIRONMENT);
        }
    };
    ExitCode::from(run(&args, logger))
}
