//! Demonstration programs for the rosbridge client.
//!
//! One binary hosts every program as a subcommand (`listener`, `talker`,
//! `service-client`, `service-server`, `action-client`, `tf-listener`,
//! `realtime`). Configuration flags precede the subcommand and are layered
//! with the configuration file and `ROSBRIDGE_*` environment variables:
//!
//! ```text
//! rosbridge-demo --host robot.local --log-format compact listener --topic /chatter
//! ```

mod cli;
mod config;
mod error;
mod output;
mod programs;
pub mod telemetry;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use rosbridge_client::Ros;
use tracing::info;

pub use error::DemoError;

use crate::cli::Cli;
use crate::output::Output;

/// Tracing target for demo program events.
pub(crate) const DEMO_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::program");

/// Runs the demo binary with `args`, writing program output to `stdout` and
/// failures to `stderr`.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write + Send + 'static,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let output = Output::new(stdout);
    match execute(&args, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(DemoError::Usage(usage)) if !usage.use_stderr() => {
            let _ = output.line(format_args!("{}", usage.render()));
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn execute(args: &[OsString], output: &Output) -> Result<(), DemoError> {
    let split = config::split_arguments(args);
    let cli = Cli::try_parse_from(&split.program).map_err(DemoError::Usage)?;
    let config = config::load(split.config)?;
    telemetry::initialise(&config)?;

    let ros = Ros::from_config(&config);
    output.line(format_args!("Connecting to {}...", ros.endpoint()))?;
    ros.connect()?;
    output.line(format_args!("Connected to {}.", ros.endpoint()))?;
    info!(target: DEMO_TARGET, program = ?cli.program, "starting program");
    programs::run(cli.program, &ros, output)
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use rstest::rstest;

    use super::*;
    use crate::output::capture::Captured;

    fn invoke(args: &[&str]) -> (ExitCode, String, String) {
        let stdout = Captured::default();
        let mut stderr = Vec::new();
        let code = run(args.iter().map(OsString::from), stdout.clone(), &mut stderr);
        (code, stdout.text(), String::from_utf8_lossy(&stderr).into_owned())
    }

    #[rstest]
    fn help_is_printed_to_stdout() {
        let (code, stdout, stderr) = invoke(&["rosbridge-demo", "--help"]);

        assert_eq!(code, ExitCode::SUCCESS);
        assert!(stdout.contains("service-client"), "help was: {stdout}");
        assert!(stderr.is_empty());
    }

    #[rstest]
    fn unknown_program_fails() {
        let (code, _, stderr) = invoke(&["rosbridge-demo", "teleport"]);

        assert_eq!(code, ExitCode::FAILURE);
        assert!(stderr.contains("teleport"), "stderr was: {stderr}");
    }

    #[rstest]
    fn unreachable_bridge_reports_the_endpoint() {
        // Bind and release a port so nothing is listening on it.
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .expect("ephemeral port")
            .port();
        let port_text = port.to_string();

        let (code, stdout, stderr) = invoke(&[
            "rosbridge-demo",
            "--host",
            "127.0.0.1",
            "--port",
            &port_text,
            "--log-filter",
            "off",
            "listener",
        ]);

        assert_eq!(code, ExitCode::FAILURE);
        assert!(stdout.contains(&format!("ws://127.0.0.1:{port}")));
        assert!(
            stderr.contains(&format!("connection to ws://127.0.0.1:{port} failed")),
            "stderr was: {stderr}"
        );
    }
}
