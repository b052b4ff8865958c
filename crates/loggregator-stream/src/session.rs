// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifetime of the streaming connection.
//!
//! Idle-timeout middleboxes close websocket connections that carry no
//! client traffic, and a log tail may stay quiet for minutes. The keeper sends
//! an application-level ping on a fixed interval and owns connection teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::constants::KEEP_ALIVE_PAYLOAD;
use crate::errors::TransportError;
use crate::scheduler::{ScheduledTask, Scheduler};

/// Connection handle supplied by the log transport.
pub trait Connection: Send + Sync {
    fn is_open(&self) -> bool;

    /// Queues a text payload. Must not block on network I/O.
    fn send_text(&self, payload: &str) -> Result<(), TransportError>;

    fn close(&self) -> Result<(), TransportError>;
}

/// Keeps a connection alive and closes it on cancellation.
pub struct SessionKeeper {
    connection: Arc<dyn Connection>,
    scheduler: Arc<dyn Scheduler>,
    ping_task: ScheduledTask,
    cancelled: AtomicBool,
}

impl SessionKeeper {
    /// Starts pinging `connection` every `interval`, first ping one interval from now.
    pub fn new(
        connection: Arc<dyn Connection>,
        scheduler: Arc<dyn Scheduler>,
        interval: Duration,
    ) -> Self {
        let pinged = Arc::clone(&connection);
        let ping_task = scheduler.schedule_repeating(
            interval,
            interval,
            Box::new(move |task| {
                if !pinged.is_open() {
                    // Expected once the stream has ended
                    debug!("Connection closed, stopping keep-alive");
                    task.cancel();
                    return;
                }
                if let Err(e) = pinged.send_text(KEEP_ALIVE_PAYLOAD) {
                    debug!("Failed to send keep-alive: {e}");
                }
            }),
        );

        Self {
            connection,
            scheduler,
            ping_task,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Stops pinging and closes the connection. Safe to call more than once.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ping_task.cancel();
        if let Err(e) = self.connection.close() {
            debug!("Ignoring error while closing connection: {e}");
        }
        debug!("Log session cancelled");
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether keep-alive pings are still scheduled.
    #[must_use]
    pub fn is_pinging(&self) -> bool {
        !self.ping_task.is_cancelled()
    }

    /// Scheduler whose lifetime is tied to this session, for other periodic work.
    #[must_use]
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.scheduler)
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl std::fmt::Debug for SessionKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeeper")
            .field("pinging", &self.is_pinging())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
