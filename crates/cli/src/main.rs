use std::process::ExitCode;

fn main() -> ExitCode {
    tripgate_cli::run()
}
