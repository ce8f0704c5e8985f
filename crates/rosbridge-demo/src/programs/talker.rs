//! Publisher counterpart of the listener.

use std::thread;
use std::time::Duration;

use rosbridge_client::{Message, Ros, Topic};

use crate::error::DemoError;
use crate::output::Output;

/// Publishes `count` numbered greetings on `topic`, `interval_ms` apart.
pub(super) fn talk(
    ros: &Ros,
    topic: &str,
    count: u32,
    interval_ms: u64,
    output: &Output,
) -> Result<(), DemoError> {
    let chatter = Topic::new(ros, topic, "std_msgs/String");
    let interval = Duration::from_millis(interval_ms);
    for sequence in 1..=count {
        if sequence > 1 {
            thread::sleep(interval);
        }
        let text = format!("hello world {sequence}");
        chatter.publish(&Message::new().with("data", text.as_str()))?;
        output.line(format_args!("Published: {text}"))?;
    }
    chatter.unadvertise()?;
    ros.close();
    Ok(())
}
