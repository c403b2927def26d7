use std::process::ExitCode;

use clap::Parser;

use common::config_load::load_path;
use common::log::{init_tracing, LogFormat, LogOptions};

use engine::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "cdc-engine", about = "MySQL binlog change-data-capture engine")]
struct Args {
    /// Path to the JSON or YAML engine config file.
    #[arg(short, long)]
    config: String,

    /// Minimum log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Log output format.
    #[arg(long, value_enum, default_value = "console")]
    log_format: LogFormatArg,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogFormatArg {
    Console,
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(LogOptions {
        level: args.log_level,
        format: match args.log_format {
            LogFormatArg::Console => LogFormat::Console,
            LogFormatArg::Json => LogFormat::Json,
        },
    });

    let config = match load_path(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, path = %args.config, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let supervisor = Supervisor::new(config);
    if let Err(err) = supervisor.start() {
        tracing::error!(error = %err, "engine failed to start");
        return ExitCode::FAILURE;
    }

    supervisor.wait_for_shutdown();
    ExitCode::SUCCESS
}
