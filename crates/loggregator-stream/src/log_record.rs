// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoded application log events.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::constants::NANOS_PER_MILLI;

/// Output stream an application wrote the log line to.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[display("stdout")]
    Stdout,
    #[display("stderr")]
    Stderr,
}

/// One log line emitted by an application instance.
///
/// Records are compared for release order by `timestamp_nanos` alone; the
/// other fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Identifier of the application that produced the line.
    pub app_id: String,
    /// Log text, decoded from UTF-8.
    pub message: String,
    /// Nanoseconds since the Unix epoch as stamped by the producer.
    pub timestamp_nanos: i64,
    pub channel: Channel,
    /// Component that emitted the line, e.g. `App`, `STG`, `RTR`.
    pub source_name: String,
    /// Instance of the component, e.g. the application instance index.
    pub source_id: String,
}

impl LogRecord {
    /// Coarse timestamp in milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_nanos / NANOS_PER_MILLI
    }

    /// Coarse timestamp as wall-clock time. Pre-epoch timestamps are clamped to the epoch.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        let millis = u64::try_from(self.timestamp_millis()).unwrap_or(0);
        UNIX_EPOCH + Duration::from_millis(millis)
    }
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {} ({}, {})",
            self.app_id,
            self.timestamp_millis(),
            self.message,
            self.channel,
            self.source_name
        )
    }
}

#[cfg(test)]
pub(crate) fn test_record(timestamp_nanos: i64) -> LogRecord {
    LogRecord {
        app_id: "c3a5f0a2-app".to_string(),
        message: format!("line at {timestamp_nanos}"),
        timestamp_nanos,
        channel: Channel::Stdout,
        source_name: "App".to_string(),
        source_id: "0".to_string(),
    }
}
