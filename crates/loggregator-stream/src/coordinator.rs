// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires frame delivery, decoding, reordering and the session lifecycle.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::StreamConfig;
use crate::decoder;
use crate::errors::{DecodeError, StreamError, TransportError};
use crate::log_record::LogRecord;
use crate::reorder_buffer::ReorderBuffer;
use crate::scheduler::Scheduler;
use crate::session::{Connection, SessionKeeper};
use crate::sink::LogSink;

/// Entry point for everything the log transport delivers for one stream.
///
/// Decoded records go through the [`ReorderBuffer`]; decode failures bypass it
/// and reach the sink immediately since they have no timestamp to order by.
/// Transport completion and failure are routed through the buffer so that they
/// only reach the sink after it has drained.
pub struct StreamCoordinator {
    buffer: ReorderBuffer,
    keeper: SessionKeeper,
    sink: Arc<dyn LogSink>,
}

impl StreamCoordinator {
    /// Starts keep-alive on `connection` and prepares an empty reorder buffer.
    ///
    /// The buffer's flush task runs on the same scheduler as the keep-alive pings.
    pub fn new(
        config: &StreamConfig,
        connection: Arc<dyn Connection>,
        sink: Arc<dyn LogSink>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let keeper = SessionKeeper::new(connection, scheduler, config.keep_alive_interval);
        let buffer = ReorderBuffer::from_config(config, Arc::clone(&sink), keeper.scheduler());
        debug!(
            hold_window = ?config.hold_window,
            flush_period = ?config.flush_period,
            "Log stream opened"
        );
        Self {
            buffer,
            keeper,
            sink,
        }
    }

    /// Handles one binary frame from the transport.
    pub fn on_frame(&self, frame: &[u8]) {
        trace!(bytes = frame.len(), "Received log frame");
        self.accept(decoder::decode(frame));
    }

    /// Handles one frame in the diagnostic text encoding.
    pub fn on_text_frame(&self, text: &str) {
        trace!(bytes = text.len(), "Received text log frame");
        self.accept(decoder::decode_text(text));
    }

    fn accept(&self, decoded: Result<LogRecord, DecodeError>) {
        if self.is_cancelled() {
            return;
        }
        match decoded {
            Ok(record) => self.buffer.on_message(record),
            Err(e) if self.buffer.is_terminated() => {
                trace!("Ignoring undecodable frame after stream end: {e}");
            }
            Err(e) => {
                warn!("Failed to decode log frame: {e}");
                self.sink.on_error(StreamError::Decode(e));
            }
        }
    }

    /// The transport will deliver no more frames.
    pub fn on_complete(&self) {
        self.buffer.on_complete();
    }

    /// The transport failed; delivered to the sink after buffered records.
    pub fn on_error(&self, error: TransportError) {
        self.buffer.on_error(StreamError::Transport(error));
    }

    /// Closes the connection and drops buffered records without notifying the sink.
    pub fn cancel(&self) {
        self.keeper.cancel();
        self.buffer.discard();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.keeper.is_cancelled()
    }

    #[must_use]
    pub fn buffer(&self) -> &ReorderBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn keeper(&self) -> &SessionKeeper {
        &self.keeper
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("buffer", &self.buffer)
            .field("keeper", &self.keeper)
            .finish_non_exhaustive()
    }
}
