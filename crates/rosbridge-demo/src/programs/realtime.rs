//! Multi-topic sensor monitor with per-topic arrival rates.

use std::time::Instant;

use rosbridge_client::{Field, Message, Ros, Topic};

use crate::error::DemoError;
use crate::output::Output;

/// Tracks the interval between consecutive messages on one topic.
#[derive(Debug, Default)]
struct RateTracker {
    last: Option<Instant>,
}

impl RateTracker {
    /// Records an arrival at `now`, returning the instantaneous rate in Hz
    /// once a previous arrival is known.
    fn observe(&mut self, now: Instant) -> Option<f64> {
        let previous = self.last.replace(now)?;
        let interval = now.saturating_duration_since(previous).as_secs_f64();
        (interval > 0.0).then(|| interval.recip())
    }
}

/// Summary statistics of one laser scan.
#[derive(Debug, PartialEq)]
struct ScanSummary {
    points: usize,
    nearest: Option<f64>,
    farthest: f64,
    mean: f64,
}

#[expect(
    clippy::float_arithmetic,
    reason = "range statistics are computed in floating point"
)]
fn summarise_scan(ranges: Field<'_>) -> Option<ScanSummary> {
    let values: Vec<f64> = ranges.iter().map(Field::as_f64).collect();
    let count = u32::try_from(values.len()).ok().filter(|count| *count > 0)?;
    let nearest = values
        .iter()
        .copied()
        .filter(|range| *range > 0.0)
        .reduce(f64::min);
    let farthest = values.iter().copied().fold(0.0, f64::max);
    let total: f64 = values.iter().sum();
    Some(ScanSummary {
        points: values.len(),
        nearest,
        farthest,
        mean: total / f64::from(count),
    })
}

fn rate_prefix(label: &str, rate: Option<f64>) -> String {
    match rate {
        Some(hz) => format!("[{label}] Freq: {hz:.1} Hz, "),
        None => format!("[{label}] "),
    }
}

fn describe_imu(message: &Message, rate: Option<f64>) -> String {
    let orientation = message.get("orientation");
    format!(
        "{}Orientation: ({:.3}, {:.3}, {:.3})",
        rate_prefix("IMU", rate),
        orientation.get("x").as_f64(),
        orientation.get("y").as_f64(),
        orientation.get("z").as_f64(),
    )
}

fn describe_scan(message: &Message, rate: Option<f64>) -> String {
    let prefix = rate_prefix("Scan", rate);
    match summarise_scan(message.get("ranges")) {
        Some(summary) => format!(
            "{prefix}Scan points: {}, Range: [{}, {:.2}], Avg: {:.2}",
            summary.points,
            summary
                .nearest
                .map_or_else(|| String::from("-"), |nearest| format!("{nearest:.2}")),
            summary.farthest,
            summary.mean,
        ),
        None => format!("{prefix}Scan points: 0"),
    }
}

fn describe_odometry(message: &Message) -> String {
    let position = message.get("pose").get("pose").get("position");
    format!(
        "[Odometry] Position: ({:.3}, {:.3}, {:.3})",
        position.get("x").as_f64(),
        position.get("y").as_f64(),
        position.get("z").as_f64(),
    )
}

fn describe_battery(message: &Message) -> String {
    format!(
        "[Battery] {:.1}% ({:.2}V)",
        message.get("percentage").as_f64(),
        message.get("voltage").as_f64(),
    )
}

/// Subscribes to the standard sensor topics and prints each message with
/// its arrival rate until the connection closes.
pub(super) fn monitor(ros: &Ros, output: &Output) -> Result<(), DemoError> {
    let imu = Topic::new(ros, "/imu/data", "sensor_msgs/Imu");
    let scan = Topic::new(ros, "/scan", "sensor_msgs/LaserScan");
    let odometry = Topic::new(ros, "/odom", "nav_msgs/Odometry");
    let battery = Topic::new(ros, "/battery_state", "sensor_msgs/BatteryState");

    let sink = output.clone();
    let mut imu_rate = RateTracker::default();
    imu.subscribe(move |message: &Message| {
        let rate = imu_rate.observe(Instant::now());
        sink.emit(format_args!("{}", describe_imu(message, rate)));
    })?;

    let sink = output.clone();
    let mut scan_rate = RateTracker::default();
    scan.subscribe(move |message: &Message| {
        let rate = scan_rate.observe(Instant::now());
        sink.emit(format_args!("{}", describe_scan(message, rate)));
    })?;

    let sink = output.clone();
    odometry.subscribe(move |message: &Message| {
        sink.emit(format_args!("{}", describe_odometry(message)));
    })?;

    let sink = output.clone();
    battery.subscribe(move |message: &Message| {
        sink.emit(format_args!("{}", describe_battery(message)));
    })?;

    output.line(format_args!("Monitoring sensor topics. Press Ctrl+C to stop."))?;
    ros.run_forever()?;
    Ok(())
}
