use std::process::ExitCode;

fn main() -> ExitCode {
    pillar_cli::run()
}
