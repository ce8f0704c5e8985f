//! Topic listeners: plain strings and TF transforms.

use rosbridge_client::{Message, Ros, Topic};

use crate::error::DemoError;
use crate::output::Output;

/// Prints the `data` field of every `std_msgs/String` on `topic`.
pub(super) fn listen(ros: &Ros, topic: &str, output: &Output) -> Result<(), DemoError> {
    let chatter = Topic::new(ros, topic, "std_msgs/String");
    let sink = output.clone();
    chatter.subscribe(move |message: &Message| {
        sink.emit(format_args!("Received: {}", message.get("data").as_string()));
    })?;
    output.line(format_args!("Listening to {topic}. Press Ctrl+C to exit."))?;
    ros.run_forever()?;
    Ok(())
}

/// Prints every transform carried by `tf2_msgs/TFMessage` on `topic`.
pub(super) fn listen_tf(ros: &Ros, topic: &str, output: &Output) -> Result<(), DemoError> {
    let tf = Topic::new(ros, topic, "tf2_msgs/TFMessage");
    let sink = output.clone();
    tf.subscribe(move |message: &Message| {
        for line in describe_transforms(message) {
            sink.emit(format_args!("{line}"));
        }
    })?;
    output.line(format_args!("Listening to {topic}. Press Ctrl+C to exit."))?;
    ros.run_forever()?;
    Ok(())
}

fn describe_transforms(message: &Message) -> Vec<String> {
    message
        .get("transforms")
        .iter()
        .map(|transform| {
            let translation = transform.get("transform").get("translation");
            format!(
                "Transform from {} to {}: ({}, {}, {})",
                transform.get("header").get("frame_id").as_string(),
                transform.get("child_frame_id").as_string(),
                translation.get("x").as_f64(),
                translation.get("y").as_f64(),
                translation.get("z").as_f64(),
            )
        })
        .collect()
}
