use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::defaults::DEFAULT_BRIDGE_PORT;

/// Host and port of a rosbridge WebSocket server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct BridgeEndpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl BridgeEndpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// WebSocket URL used for the handshake.
    #[must_use]
    pub fn url(&self) -> String {
        self.to_string()
    }

    /// `host:port` pair suitable for [`std::net::ToSocketAddrs`].
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for BridgeEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "ws://{}:{}", self.host, self.port)
    }
}

impl FromStr for BridgeEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.contains("://") {
            return parse_url(input);
        }

        match input.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(EndpointParseError::MissingHost(input.to_owned()));
                }
                let parsed = port
                    .parse::<u16>()
                    .map_err(|_| EndpointParseError::InvalidPort(input.to_owned()))?;
                Ok(Self::new(host, parsed))
            }
            None if input.is_empty() => Err(EndpointParseError::MissingHost(input.to_owned())),
            None => Ok(Self::new(input, DEFAULT_BRIDGE_PORT)),
        }
    }
}

fn parse_url(input: &str) -> Result<BridgeEndpoint, EndpointParseError> {
    let url = Url::parse(input)?;
    if url.scheme() != "ws" {
        return Err(EndpointParseError::UnsupportedScheme(url.scheme().to_owned()));
    }
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
    let port = url.port().unwrap_or(DEFAULT_BRIDGE_PORT);
    Ok(BridgeEndpoint::new(host, port))
}

/// Errors encountered while parsing a [`BridgeEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not `ws`.
    #[error("unsupported bridge scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing bridge host in '{0}'")]
    MissingHost(String),
    /// Port was not a valid TCP port number.
    #[error("invalid bridge port in '{0}'")]
    InvalidPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
