//! Structured logging for the demo binary.
//!
//! Records go to stderr so program output on stdout stays clean. The
//! subscriber is installed at most once per process; later calls are no-ops.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use rosbridge_config::Config;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static INSTALLED: OnceCell<()> = OnceCell::new();

type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// Failures while setting up logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid filter directive.
    #[error("log filter `{filter}` is invalid: {reason}")]
    Filter {
        /// The rejected directive.
        filter: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// A global subscriber was installed by someone else first.
    #[error("could not install the log subscriber: {0}")]
    Install(#[source] SetGlobalDefaultError),
}

/// Installs the process-wide log subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Install`] when another global subscriber exists.
pub fn initialise(config: &Config) -> Result<(), TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            let subscriber = build_subscriber(config)?;
            tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Install)
        })
        .map(|&()| ())
}

fn build_subscriber(config: &Config) -> Result<BoxedSubscriber, TelemetryError> {
    let filter =
        EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            reason: error.to_string(),
        })?;
    let format = config.log_format();
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!format.is_structured() && io::stderr().is_terminal())
        .with_thread_names(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(if format.is_structured() {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        Box::new(builder.compact().finish())
    })
}

#[cfg(test)]
mod tests {
    use rosbridge_config::LogFormat;
    use rstest::rstest;

    use super::*;

    fn config_with(filter: &str, format: LogFormat) -> Config {
        Config {
            log_filter: filter.to_owned(),
            log_format: format,
            ..Config::default()
        }
    }

    #[rstest]
    fn malformed_filter_is_rejected() {
        let config = config_with("rosbridge_client=notalevel", LogFormat::Json);

        match build_subscriber(&config) {
            Err(TelemetryError::Filter { filter, .. }) => {
                assert_eq!(filter, "rosbridge_client=notalevel");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("filter should be rejected"),
        }
    }

    #[rstest]
    #[case(LogFormat::Json)]
    #[case(LogFormat::Compact)]
    fn valid_settings_build_a_subscriber(#[case] format: LogFormat) {
        let config = config_with("rosbridge_client=debug,info", format);

        assert!(build_subscriber(&config).is_ok());
    }
}
