// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Minimum time a record stays buffered before it may be released.
pub const DEFAULT_HOLD_WINDOW: Duration = Duration::from_millis(1000);

/// Cadence at which the reorder buffer is inspected. Must not exceed the hold window.
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_millis(200);

/// 25 seconds, the interval used by the Go client.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Upper bound accepted for the hold window and keep-alive interval.
pub const MAX_CONFIGURED_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub const KEEP_ALIVE_PAYLOAD: &str = "keep alive";

pub const NANOS_PER_MILLI: i64 = 1_000_000;

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
