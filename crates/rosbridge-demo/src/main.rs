//! Entry point for the rosbridge demonstration programs.
//!
//! The binary delegates to [`rosbridge_demo::run`], which resolves
//! configuration, installs telemetry, connects to the bridge, and runs the
//! selected program.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stderr = io::stderr().lock();
    rosbridge_demo::run(std::env::args_os(), io::stdout(), &mut stderr)
}
