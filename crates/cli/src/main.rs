use std::process::ExitCode;

fn main() -> ExitCode {
    hrbridge_cli::run()
}
