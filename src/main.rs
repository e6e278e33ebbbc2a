use std::process::ExitCode;

fn main() -> ExitCode {
    rustmatch::cli::run()
}
