// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Downstream consumers of ordered log records.

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::StreamError;
use crate::log_record::LogRecord;

/// Receives the ordered output of a log stream.
///
/// Callbacks are never invoked while the reorder buffer's lock is held, so an
/// implementation may call back into the stream. They should not block.
pub trait LogSink: Send + Sync {
    /// Called for each record, in non-decreasing timestamp order.
    fn on_message(&self, record: LogRecord);

    /// Called for every undecodable frame and at most once for a terminal transport failure.
    fn on_error(&self, error: StreamError);

    /// Called at most once, after every buffered record, unless a terminal error was delivered.
    fn on_complete(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Message(LogRecord),
    Error(StreamError),
    Complete,
}

/// [`LogSink`] that forwards every callback over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            debug!("Log sink receiver dropped, discarding event");
        }
    }
}

impl LogSink for ChannelSink {
    fn on_message(&self, record: LogRecord) {
        self.forward(SinkEvent::Message(record));
    }

    fn on_error(&self, error: StreamError) {
        self.forward(SinkEvent::Error(error));
    }

    fn on_complete(&self) {
        self.forward(SinkEvent::Complete);
    }
}
