use std::process::ExitCode;

fn main() -> ExitCode {
    pagesmith_cli::run()
}
