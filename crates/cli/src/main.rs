use std::process::ExitCode;

fn main() -> ExitCode {
    jobrelay_cli::run()
}
