// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::time::Duration;

use loggregator_stream::{decoder, Channel, LogRecord, SinkEvent, StreamConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

pub const APP_ID: &str = "4e1b0c7d-tail-test";

/// Short timings so a stream drains within a test's patience.
pub fn fast_config() -> StreamConfig {
    StreamConfig {
        hold_window: Duration::from_millis(100),
        flush_period: Duration::from_millis(20),
        ..Default::default()
    }
}

pub fn record(timestamp_nanos: i64) -> LogRecord {
    LogRecord {
        app_id: APP_ID.to_string(),
        message: format!("request {timestamp_nanos} served"),
        timestamp_nanos,
        channel: Channel::Stdout,
        source_name: "RTR".to_string(),
        source_id: "1".to_string(),
    }
}

pub fn frame(timestamp_nanos: i64) -> Vec<u8> {
    decoder::encode(&record(timestamp_nanos))
}

/// Next sink event, failing the test if none arrives within five seconds.
pub async fn next_event(events: &mut UnboundedReceiver<SinkEvent>) -> SinkEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a sink event")
        .expect("sink channel closed")
}
