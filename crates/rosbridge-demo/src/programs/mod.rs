//! The demonstration programs, each driving a connected [`Ros`].

mod action;
mod listeners;
mod realtime;
mod services;
mod talker;

use std::thread;

use rosbridge_client::Ros;
use tracing::{debug, error};

use crate::DEMO_TARGET;
use crate::cli::Program;
use crate::error::DemoError;
use crate::output::Output;

/// Runs `program` against the connected `ros`.
pub(crate) fn run(program: Program, ros: &Ros, output: &Output) -> Result<(), DemoError> {
    match program {
        Program::Listener { topic } => listeners::listen(ros, &topic, output),
        Program::Talker {
            topic,
            count,
            interval_ms,
        } => talker::talk(ros, &topic, count, interval_ms, output),
        Program::ServiceClient { service, a, b } => services::call_add(ros, &service, a, b, output),
        Program::ServiceServer { service } => services::serve_add(ros, &service, output),
        Program::ActionClient { action, order } => action::fibonacci(ros, &action, order, output),
        Program::TfListener { topic } => listeners::listen_tf(ros, &topic, output),
        Program::Realtime => realtime::monitor(ros, output),
    }
}

/// Runs `body` while a scoped thread reads from `ros`, then closes the
/// connection and joins the reader.
fn with_reader<T>(
    ros: &Ros,
    body: impl FnOnce() -> Result<T, DemoError>,
) -> Result<T, DemoError> {
    thread::scope(|scope| {
        let reader = scope.spawn(|| ros.run_forever());
        let outcome = body();
        ros.close();
        match reader.join() {
            Ok(Ok(())) => {}
            Ok(Err(reader_error)) => {
                debug!(target: DEMO_TARGET, error = %reader_error, "reader stopped with an error");
            }
            Err(_) => error!(target: DEMO_TARGET, "reader thread panicked"),
        }
        outcome
    })
}
