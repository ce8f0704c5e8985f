//! Fibonacci action client.

use rosbridge_client::{ActionClient, Field, Message, Ros};

use super::with_reader;
use crate::error::DemoError;
use crate::output::Output;

/// Sends a Fibonacci goal of `order` to `action` and prints the result.
pub(super) fn fibonacci(
    ros: &Ros,
    action: &str,
    order: u32,
    output: &Output,
) -> Result<(), DemoError> {
    let client = ActionClient::new(ros, action, "action_tutorials_interfaces/action/Fibonacci");
    let goal = Message::new().with("order", order);
    let sink = output.clone();
    let result = with_reader(ros, || {
        Ok(client.send_goal_with_feedback(
            &goal,
            move |feedback: &Message| {
                let partial = format_sequence(feedback.get("partial_sequence"));
                sink.emit(format_args!("Feedback: {partial}"));
            },
            ros.goal_timeout(),
        )?)
    })?;
    output.line(format_args!(
        "Result sequence: {}",
        format_sequence(result.get("sequence"))
    ))?;
    Ok(())
}

fn format_sequence(sequence: Field<'_>) -> String {
    let items: Vec<String> = sequence
        .iter()
        .map(|item| item.as_i64().to_string())
        .collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(json!({"sequence": [0, 1, 1, 2, 3, 5]}), "[0, 1, 1, 2, 3, 5]")]
    #[case(json!({"sequence": []}), "[]")]
    #[case(json!({}), "[]")]
    fn formats_sequences(#[case] result: serde_json::Value, #[case] expected: &str) {
        let message = Message::from(result);

        assert_eq!(format_sequence(message.get("sequence")), expected);
    }
}
