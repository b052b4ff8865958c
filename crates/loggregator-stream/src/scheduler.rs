// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Repeating-task scheduling shared by the reorder buffer and the session keeper.
//!
//! Components only depend on the [`Scheduler`] trait, so one scheduler can be
//! shared across a whole log session or created privately per component.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Delays beyond this are treated as "never" rather than overflowing the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Callback run on every tick. Receives its own task handle so it can stop itself.
pub type TickFn = Box<dyn Fn(&ScheduledTask) + Send + Sync + 'static>;

/// Handle to a scheduled repeating task.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    token: CancellationToken,
}

impl ScheduledTask {
    /// Stops future ticks. A tick already in progress runs to completion.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub trait Scheduler: Send + Sync {
    /// Runs `task` after `initial_delay` and then every `period` until cancelled.
    fn schedule_repeating(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: TickFn,
    ) -> ScheduledTask;
}

/// [`Scheduler`] backed by tokio timers, one spawned task per schedule.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    shutdown: CancellationToken,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    /// Creates a scheduler on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    #[must_use]
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn shared() -> Arc<dyn Scheduler> {
        Arc::new(Self::new())
    }

    /// Cancels every task created by this scheduler, including future ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: TickFn,
    ) -> ScheduledTask {
        let handle = ScheduledTask {
            token: self.shutdown.child_token(),
        };
        let tick_handle = handle.clone();

        self.runtime.spawn(async move {
            // tokio rejects a zero period
            let period = period.clamp(Duration::from_millis(1), FAR_FUTURE);
            let Some(start) = Instant::now().checked_add(initial_delay.min(FAR_FUTURE)) else {
                tick_handle.token.cancelled().await;
                return;
            };
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = tick_handle.token.cancelled() => break,
                    _ = ticker.tick() => task(&tick_handle),
                }
            }
            trace!("scheduled task stopped");
        });

        handle
    }
}
