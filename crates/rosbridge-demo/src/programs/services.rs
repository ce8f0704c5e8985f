//! `AddTwoInts` service client and provider.

use rosbridge_client::{Message, Ros, ServiceClient, ServiceServer};

use super::with_reader;
use crate::error::DemoError;
use crate::output::Output;

const ADD_TWO_INTS: &str = "example_interfaces/srv/AddTwoInts";

/// Calls `service` once with `a` and `b` and prints the sum.
pub(super) fn call_add(
    ros: &Ros,
    service: &str,
    a: i64,
    b: i64,
    output: &Output,
) -> Result<(), DemoError> {
    let client = ServiceClient::new(ros, service, ADD_TWO_INTS);
    let request = Message::new().with("a", a).with("b", b);
    let response = with_reader(ros, || Ok(client.call_default(&request)?))?;
    output.line(format_args!(
        "Service response: {}",
        response.get("sum").as_i64()
    ))?;
    Ok(())
}

/// Answers `service` requests until the connection closes.
pub(super) fn serve_add(ros: &Ros, service: &str, output: &Output) -> Result<(), DemoError> {
    let server = ServiceServer::new(ros, service, ADD_TWO_INTS);
    let sink = output.clone();
    server.advertise(move |request: &Message| {
        let (a, b) = (request.get("a").as_i64(), request.get("b").as_i64());
        sink.emit(format_args!("Service called with a={a}, b={b}"));
        add(a, b).map(|sum| Message::new().with("sum", sum))
    })?;
    output.line(format_args!("Service server running. Press Ctrl+C to exit."))?;
    ros.run_forever()?;
    Ok(())
}

fn add(a: i64, b: i64) -> Result<i64, String> {
    a.checked_add(b)
        .ok_or_else(|| format!("{a} + {b} overflows a 64-bit integer"))
}
