use clap::Parser;
use stratforge::cli::{run, Cli};
use stratforge::logging;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(&cli.log_level, cli.log_json) {
        eprintln!("error: failed to initialise logging: {e}");
        return std::process::ExitCode::from(1);
    }
    run(cli)
}
