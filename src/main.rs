//! `aqmon_service` daemon entry point.
//!
//! ```text
//! aqmon_service [--config <path>] [--once | --check]
//! ```
//!
//! - no flag: poll forever on aligned boundaries under the supervisor
//! - `--once`: run a single cycle right now and exit
//! - `--check`: fetch and extract once, print the sample as JSON, write nothing

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use aqmon_service::config::{self, MonitorConfig};
use aqmon_service::ingest::page::{HttpPageFetcher, PageFetcher};
use aqmon_service::logging::{self, Component};
use aqmon_service::model::{CycleError, FetchError};
use aqmon_service::recorder::CsvRecorder;
use aqmon_service::runner::{saved_line, CycleRunner};
use aqmon_service::schedule::Scheduler;
use aqmon_service::shutdown::Shutdown;
use aqmon_service::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Once,
    Check,
}

#[derive(Parser, Debug)]
#[command(name = "aqmon_service", version, about = "Benzene station monitor")]
struct Cli {
    /// Config file (defaults to $AQMON_CONFIG, then ./aqmon.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run a single cycle right now and exit
    #[arg(long, conflicts_with = "check")]
    once: bool,

    /// Fetch and extract once, print the sample as JSON, write nothing
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.once {
            Mode::Once
        } else if self.check {
            Mode::Check
        } else {
            Mode::Serve
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load_from_env(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    // validate() has already checked the level string.
    let level = config.log_level().unwrap_or(logging::LogLevel::Info);
    logging::init_logger(level, Some(&*config.error_log_path.to_string_lossy()));

    let shutdown = Shutdown::new();
    let handler_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_shutdown.trigger()) {
        logging::warn(
            Component::System,
            &format!("Could not install interrupt handler: {}", e),
        );
    }

    let runner = CycleRunner::new(
        config.url.clone(),
        Scheduler::new(config.poll_interval()),
        CsvRecorder::new(config.data_log_path.clone()),
        shutdown.clone(),
    );

    let code = match cli.mode() {
        Mode::Serve => serve(runner, &config, shutdown),
        Mode::Once => run_once(runner, &config, shutdown, true),
        Mode::Check => run_once(runner, &config, shutdown, false),
    };

    println!("[INFO] Exiting gracefully.");
    code
}

fn serve(runner: CycleRunner<CsvRecorder>, config: &MonitorConfig, shutdown: Shutdown) -> ExitCode {
    let settings = config.fetch_settings();
    let make_fetcher = move || {
        HttpPageFetcher::connect(settings.clone(), shutdown.clone())
            .map(|f| Box::new(f) as Box<dyn PageFetcher>)
    };

    let mut supervisor = Supervisor::new(runner, make_fetcher, config.cooldown());
    supervisor.serve();
    ExitCode::SUCCESS
}

fn run_once(
    runner: CycleRunner<CsvRecorder>,
    config: &MonitorConfig,
    shutdown: Shutdown,
    record: bool,
) -> ExitCode {
    let mut fetcher = match HttpPageFetcher::connect(config.fetch_settings(), shutdown) {
        Ok(f) => f,
        Err(e) => {
            logging::error(Component::Fetch, &e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let result = if record {
        runner.run_cycle(&mut fetcher)
    } else {
        runner.probe(&mut fetcher)
    };
    fetcher.close();

    match result {
        Ok(sample) if record => {
            logging::status(&saved_line(&sample));
            ExitCode::SUCCESS
        }
        Ok(sample) => match serde_json::to_string_pretty(&sample) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                logging::error(Component::System, &format!("Cannot render sample: {}", e));
                ExitCode::FAILURE
            }
        },
        Err(CycleError::Fetch(FetchError::Interrupted)) => ExitCode::SUCCESS,
        Err(e) => {
            logging::log_cycle_failure(&e);
            ExitCode::FAILURE
        }
    }
}
