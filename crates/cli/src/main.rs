use std::process::ExitCode;

fn main() -> ExitCode {
    fred_cli::run()
}
