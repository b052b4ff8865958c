// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamp-ordered delivery of streamed Loggregator application logs.
//!
//! Raw frames arrive from a log transport in whatever order the upstream
//! multiplexer produced them. The pipeline decodes each frame into a
//! [`LogRecord`], holds records in a [`ReorderBuffer`] for a fixed window and
//! releases them to a [`LogSink`] in timestamp order. A [`SessionKeeper`]
//! keeps the underlying connection alive independently of the data path.
//!
//! ```text
//!  transport ──frame──> StreamCoordinator ──decode──> ReorderBuffer ──ordered──> LogSink
//!      │                     │   └──decode error────────────────────────────────^
//!      └──complete/error─────┘──────────────terminal event (after drain)──────^
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod decoder;
pub mod errors;
pub mod log_record;
pub mod reorder_buffer;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod transport;

pub use config::StreamConfig;
pub use coordinator::StreamCoordinator;
pub use errors::{ConfigError, DecodeError, StreamError, TransportError};
pub use log_record::{Channel, LogRecord};
pub use reorder_buffer::{BufferStats, ReorderBuffer, TerminalEvent};
pub use scheduler::{ScheduledTask, Scheduler, TokioScheduler};
pub use session::{Connection, SessionKeeper};
pub use sink::{ChannelSink, LogSink, SinkEvent};
pub use transport::websocket::{stream_logs, LogEndpoint, LogStream};
