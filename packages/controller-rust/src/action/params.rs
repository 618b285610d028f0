//! Typed access to descriptor parameters.

use std::fmt::Display;
use std::str::FromStr;

use routing_core::descriptor::param;
use routing_core::types::{ConnectionFormat, RampType, Volume};
use routing_core::{ActionDescriptor, ControlError, ControlResult};

use crate::config::ControllerConfig;

/// Parameters of one descriptor with the controller defaults.
pub struct Params<'a> {
    descriptor: &'a ActionDescriptor,
    config: &'a ControllerConfig,
}

impl<'a> Params<'a> {
    #[must_use]
    pub fn new(descriptor: &'a ActionDescriptor, config: &'a ControllerConfig) -> Self {
        Self { descriptor, config }
    }

    #[must_use]
    pub fn text(&self, key: &str) -> Option<&'a str> {
        self.descriptor.param(key).filter(|v| !v.is_empty())
    }

    /// # Errors
    ///
    /// Returns `Parameter` if `key` is unbound.
    pub fn required_text(&self, key: &str) -> ControlResult<&'a str> {
        self.text(key)
            .ok_or_else(|| ControlError::Parameter(format!("{key} is unbound")))
    }

    /// # Errors
    ///
    /// Returns `Parameter` if the bound value does not parse.
    pub fn parse<T: FromStr>(&self, key: &str) -> ControlResult<Option<T>> {
        match self.text(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                ControlError::Parameter(format!("{key} has invalid value {raw}"))
            }),
        }
    }

    /// # Errors
    ///
    /// Returns `Parameter` if the value is unbound or does not parse.
    pub fn required<T: FromStr>(&self, key: &str) -> ControlResult<T> {
        self.parse(key)?
            .ok_or_else(|| ControlError::Parameter(format!("{key} is unbound")))
    }

    /// # Errors
    ///
    /// Returns `Parameter` if the bound value does not parse.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> ControlResult<T> {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// Required volume level, checked against the configured volume range.
    ///
    /// # Errors
    ///
    /// Returns `Parameter` if the value is unbound, does not parse or lies
    /// outside `min_volume..=max_volume`.
    pub fn volume(&self, key: &str) -> ControlResult<Volume> {
        within(
            key,
            self.required(key)?,
            self.config.min_volume,
            self.config.max_volume,
        )
    }

    /// Request timeout; the controller default when unbound.
    ///
    /// # Errors
    ///
    /// Returns `Parameter` if the bound value does not parse, is zero or
    /// exceeds `max_action_timeout_ms`.
    pub fn timeout_ms(&self) -> ControlResult<u64> {
        match self.parse(param::TIMEOUT)? {
            None => Ok(self.config.default_action_timeout_ms),
            Some(timeout) => within(
                param::TIMEOUT,
                timeout,
                1,
                self.config.max_action_timeout_ms,
            ),
        }
    }

    /// # Errors
    ///
    /// Returns `Parameter` if the bound value does not parse.
    pub fn rollback(&self) -> ControlResult<bool> {
        self.parse_or(param::ROLLBACK, false)
    }

    /// # Errors
    ///
    /// Returns `Parameter` if a bound value does not parse.
    pub fn ramp(&self) -> ControlResult<(RampType, u16)> {
        Ok((
            self.parse_or(param::RAMP_TYPE, self.config.default_ramp_type)?,
            self.parse_or(param::RAMP_TIME, self.config.default_ramp_time_ms)?,
        ))
    }

    /// # Errors
    ///
    /// Returns `Parameter` if the bound value does not parse.
    pub fn connection_format(&self) -> ControlResult<ConnectionFormat> {
        self.parse_or(
            param::CONNECTION_FORMAT,
            self.config.default_connection_format,
        )
    }
}

fn within<T: PartialOrd + Display>(key: &str, value: T, min: T, max: T) -> ControlResult<T> {
    if value < min || value > max {
        return Err(ControlError::Parameter(format!(
            "{key} {value} out of configured range {min}..={max}"
        )));
    }
    Ok(value)
}
