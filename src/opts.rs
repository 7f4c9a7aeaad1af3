//! Session options.

use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::session::ProtocolVersion;

/// Options of an established session, as seen by the command core.
#[derive(Debug, Clone)]
pub struct SessionOpts {
    /// Hostname or IP address, used to reach the server for cancel requests.
    ///
    /// Default: `"localhost"`
    pub host: String,

    /// Port number for the PostgreSQL server.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Unix socket path. Takes precedence over `host`/`port` for cancel requests.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Negotiated protocol generation.
    ///
    /// Default: `ProtocolVersion::V3`
    pub protocol_version: ProtocolVersion,

    /// Whether server-side prepared statements may be used.
    ///
    /// Default: `true`
    pub supports_prepare: bool,

    /// Prepare every command before its first execution.
    ///
    /// Default: `false`
    pub always_prepare: bool,

    /// Timeout inherited by commands. Zero disables it.
    ///
    /// Default: `20s`
    pub command_timeout: Duration,

    /// Initial `standard_conforming_strings`; later ParameterStatus messages override it.
    ///
    /// Default: `true`
    pub standard_conforming_strings: bool,

    /// Prefix of generated plan names.
    ///
    /// Default: `"zero_plan"`
    pub plan_name_prefix: String,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            socket: None,
            protocol_version: ProtocolVersion::V3,
            supports_prepare: true,
            always_prepare: false,
            command_timeout: Duration::from_secs(20),
            standard_conforming_strings: true,
            plan_name_prefix: "zero_plan".to_string(),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!("Invalid {}: {}", key, value))),
    }
}

impl TryFrom<&Url> for SessionOpts {
    type Error = Error;

    /// Read session options from a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database][?param1=value1&..]`
    ///
    /// Supported query parameters:
    /// - `protocol_version`: 2 or 3
    /// - `supports_prepare`, `always_prepare`, `standard_conforming_strings`:
    ///   true/True/1/yes/on or false/False/0/no/off
    /// - `command_timeout`: seconds (non-negative integer, 0 = none)
    /// - `plan_name_prefix`: prefix of generated plan names
    /// - `host`: Unix socket directory or path when it starts with `/`
    ///
    /// Other parameters belong to the connection layer and are ignored.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "pg"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = SessionOpts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(5432),
            ..SessionOpts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "protocol_version" => {
                    opts.protocol_version = match value.as_ref() {
                        "2" => ProtocolVersion::V2,
                        "3" => ProtocolVersion::V3,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid protocol_version: expected 2 or 3, got {}",
                                value
                            )));
                        }
                    };
                }
                "supports_prepare" => opts.supports_prepare = parse_bool(&key, &value)?,
                "always_prepare" => opts.always_prepare = parse_bool(&key, &value)?,
                "standard_conforming_strings" => {
                    opts.standard_conforming_strings = parse_bool(&key, &value)?;
                }
                "command_timeout" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        Error::InvalidUsage(format!("Invalid command_timeout: {}", value))
                    })?;
                    opts.command_timeout = Duration::from_secs(secs);
                }
                "plan_name_prefix" => {
                    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                        return Err(Error::InvalidUsage(format!(
                            "Invalid plan_name_prefix: {}",
                            value
                        )));
                    }
                    opts.plan_name_prefix = value.to_string();
                }
                "host" if value.starts_with('/') => {
                    opts.socket = Some(if value.contains(".s.PGSQL.") {
                        value.to_string()
                    } else {
                        format!("{}/.s.PGSQL.{}", value.trim_end_matches('/'), opts.port)
                    });
                }
                _ => {}
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for SessionOpts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
