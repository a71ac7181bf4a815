use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match xrayd::run_supervisor() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed yet, so stderr is the only sink.
            writeln!(io::stderr().lock(), "xrayd: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
