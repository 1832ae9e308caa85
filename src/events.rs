//! Core event types for the blue/green pool watcher
//!
//! This module defines the records parsed from the proxy access log, the pool
//! identities they are classified into, and the alert events handed to the
//! notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// One of the two interchangeable backend pools behind the proxy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PoolIdentity {
    Blue,
    Green,
    /// Pool could not be determined for a record
    Unknown,
}

impl PoolIdentity {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolIdentity::Blue => "blue",
            PoolIdentity::Green => "green",
            PoolIdentity::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != PoolIdentity::Unknown
    }
}

impl fmt::Display for PoolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolIdentity {
    type Err = String;

    /// Parse a pool name case-insensitively. Only `blue` and `green` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blue" => Ok(PoolIdentity::Blue),
            "green" => Ok(PoolIdentity::Green),
            other => Err(format!("unrecognized pool '{}'", other)),
        }
    }
}

/// Kind of alert, which selects presentation and maintenance-mode handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Live traffic moved to the other pool
    Failover,
    /// Error rate over the sliding window exceeded the threshold
    ErrorRate,
    /// A previously alerted condition cleared
    Recovery,
    /// Always delivered, even in maintenance mode
    Critical,
    /// Informational notice
    Info,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Failover => "failover",
            AlertKind::ErrorRate => "error_rate",
            AlertKind::Recovery => "recovery",
            AlertKind::Critical => "critical",
            AlertKind::Info => "info",
        }
    }

    /// Emoji used as the header prefix in chat notifications
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertKind::Failover => "🔄",
            AlertKind::ErrorRate => "⚠️",
            AlertKind::Recovery => "✅",
            AlertKind::Critical => "🚨",
            AlertKind::Info => "ℹ️",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured values behind an alert's message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AlertDetail {
    Failover {
        from: PoolIdentity,
        to: PoolIdentity,
    },
    ErrorRate {
        rate_percent: f64,
        errors: usize,
        total: usize,
        window_capacity: usize,
    },
    None,
}

/// An alert produced by a detector, delivered once and then discarded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    /// Human-readable message (Slack mrkdwn)
    pub message: String,
    pub timestamp: Timestamp,
    pub detail: AlertDetail,
}

impl AlertEvent {
    /// Create an alert without structured detail
    pub fn new(kind: AlertKind, message: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp,
            detail: AlertDetail::None,
        }
    }

    pub fn with_detail(mut self, detail: AlertDetail) -> Self {
        self.detail = detail;
        self
    }
}

/// One access log line emitted by the proxy
///
/// The proxy writes heterogeneous JSON: `status` may be a number or a string,
/// `upstream_status` may be a comma-separated list, and any field may be missing.
/// Fields are therefore kept as raw JSON values and interpreted by the classifiers.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LogRecord {
    #[serde(default)]
    pub pool: Option<Value>,
    #[serde(default)]
    pub upstream_addr: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub upstream_status: Option<Value>,
}

impl LogRecord {
    /// Parse a single log line
    ///
    /// Anything that is not a JSON object is rejected, and so is the empty
    /// object `{}`.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line.trim())?;
        match value.as_object() {
            None => return Err(serde::de::Error::custom("log line is not a JSON object")),
            Some(map) if map.is_empty() => {
                return Err(serde::de::Error::custom("log line is an empty JSON object"))
            }
            Some(_) => {}
        }
        serde_json::from_value(value)
    }

    /// Pool declared by the proxy itself, if it is a recognized pool name
    ///
    /// Empty strings and the `-` placeholder count as absent.
    pub fn declared_pool(&self) -> Option<PoolIdentity> {
        match self.pool.as_ref()? {
            Value::String(s) if s.trim().is_empty() || s.trim() == "-" => None,
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// `upstream_addr` as text; numbers are rendered in decimal
    pub fn upstream_addr(&self) -> Option<String> {
        match self.upstream_addr.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
