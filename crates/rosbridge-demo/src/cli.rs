//! Command-line interface of the demo binary.
//!
//! Configuration flags (`--host`, `--port`, and the other [`CONFIG_FLAGS`])
//! come first and are resolved by `ortho_config`; the program to run and its
//! own arguments follow.

use clap::{Parser, Subcommand};

/// Flags consumed by the configuration loader rather than the program parser.
pub(crate) const CONFIG_FLAGS: &[&str] = &[
    "--config-path",
    "--host",
    "--port",
    "--call-timeout-ms",
    "--goal-timeout-ms",
    "--log-filter",
    "--log-format",
];

/// Demonstration programs for the rosbridge client.
#[derive(Parser, Debug)]
#[command(name = "rosbridge-demo", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Program to run.
    #[command(subcommand)]
    pub(crate) program: Program,
}

/// The demonstration programs.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub(crate) enum Program {
    /// Prints every string published on a topic.
    Listener {
        /// Topic to subscribe to.
        #[arg(long, default_value = "/chatter")]
        topic: String,
    },
    /// Publishes numbered strings on a topic.
    Talker {
        /// Topic to publish on.
        #[arg(long, default_value = "/chatter")]
        topic: String,
        /// Number of messages to publish.
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Delay between messages, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Calls an `AddTwoInts` service once and prints the sum.
    ServiceClient {
        /// Service to call.
        #[arg(long, default_value = "/add_two_ints")]
        service: String,
        /// First operand.
        #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
        a: i64,
        /// Second operand.
        #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
        b: i64,
    },
    /// Provides an `AddTwoInts` service until the connection closes.
    ServiceServer {
        /// Service to advertise.
        #[arg(long, default_value = "/add_two_ints")]
        service: String,
    },
    /// Sends a Fibonacci goal and prints the resulting sequence.
    ActionClient {
        /// Action to send the goal to.
        #[arg(long, default_value = "/fibonacci")]
        action: String,
        /// Order of the requested sequence.
        #[arg(long, default_value_t = 10)]
        order: u32,
    },
    /// Prints every transform published on a TF topic.
    TfListener {
        /// Topic carrying `tf2_msgs/TFMessage`.
        #[arg(long, default_value = "/tf")]
        topic: String,
    },
    /// Monitors IMU, laser scan, odometry, and battery topics with per-topic
    /// rate statistics.
    Realtime,
}
