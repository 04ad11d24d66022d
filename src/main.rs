use brrtdispatch::cli::{run_cli, Cli};
use brrtdispatch::observability::{init_logging, LogConfig};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::default_dev()
    } else {
        LogConfig::from_env()
    };
    // Held until exit so buffered log lines are flushed.
    let _log_guard = init_logging(&log_config)?;

    run_cli(cli)
}
