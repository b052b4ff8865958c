// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time-windowed reordering of log records.
//!
//! Loggregator multiplexes logs from many producers, so bursts of records can
//! arrive with their relative order inverted. Every record is held for at
//! least the hold window before it may be released; as long as the true skew
//! between two records is within that window, the sink sees them in
//! timestamp order.
//!
//! ```text
//!   on_message ──> [ min-heap by timestamp ] ──flush tick──> LogSink::on_message
//!                           │  (released once older than the hold window)
//!   on_complete / on_error ─┴──> pending terminal event ──(heap empty)──> LogSink
//! ```
//!
//! The flush task is scheduled lazily on the first arrival and cancelled as
//! soon as the heap drains, so an idle buffer costs nothing. A terminal event
//! is delivered exactly once, after everything that arrived before it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::StreamConfig;
use crate::errors::StreamError;
use crate::log_record::LogRecord;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::sink::LogSink;

/// The single completion-or-error signal that ends a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Completed,
    Failed(StreamError),
}

impl TerminalEvent {
    fn deliver(self, sink: &dyn LogSink) {
        match self {
            TerminalEvent::Completed => sink.on_complete(),
            TerminalEvent::Failed(error) => sink.on_error(error),
        }
    }
}

/// Counters describing what the buffer did with the records it was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub received: u64,
    pub emitted: u64,
    /// Records that arrived after a terminal event or after the buffer was discarded.
    pub post_terminal_dropped: u64,
    /// Records that arrived too late to be emitted without breaking timestamp order.
    pub late_dropped: u64,
}

#[derive(Debug)]
struct BufferEntry {
    record: LogRecord,
    arrival: Instant,
    seq: u64,
}

impl Ord for BufferEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .timestamp_nanos
            .cmp(&other.record.timestamp_nanos)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for BufferEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for BufferEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BufferEntry {}

#[derive(Debug)]
enum Lifecycle {
    Open,
    /// A terminal event was recorded and waits for the heap to drain.
    Terminating(TerminalEvent),
    /// The terminal event was delivered or the buffer was discarded.
    Closed,
}

#[derive(Debug)]
struct BufferState {
    queue: BinaryHeap<Reverse<BufferEntry>>,
    lifecycle: Lifecycle,
    flush_task: Option<ScheduledTask>,
    next_seq: u64,
    last_emitted: Option<i64>,
    stats: BufferStats,
}

struct Shared {
    state: Mutex<BufferState>,
    sink: Arc<dyn LogSink>,
    scheduler: Arc<dyn Scheduler>,
    hold_window: Duration,
    flush_period: Duration,
}

/// Holds records for a minimum dwell time and releases them in timestamp order.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct ReorderBuffer {
    shared: Arc<Shared>,
}

impl ReorderBuffer {
    /// Creates a buffer. `flush_period` is clamped to `hold_window`.
    pub fn new(
        sink: Arc<dyn LogSink>,
        scheduler: Arc<dyn Scheduler>,
        hold_window: Duration,
        flush_period: Duration,
    ) -> Self {
        let shared = Shared {
            state: Mutex::new(BufferState {
                queue: BinaryHeap::new(),
                lifecycle: Lifecycle::Open,
                flush_task: None,
                next_seq: 0,
                last_emitted: None,
                stats: BufferStats::default(),
            }),
            sink,
            scheduler,
            hold_window,
            flush_period: flush_period.min(hold_window),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn from_config(
        config: &StreamConfig,
        sink: Arc<dyn LogSink>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self::new(sink, scheduler, config.hold_window, config.flush_period)
    }

    /// Buffers a record. Records arriving after a terminal event are dropped.
    pub fn on_message(&self, record: LogRecord) {
        let mut state = self.shared.lock();
        if !matches!(state.lifecycle, Lifecycle::Open) {
            state.stats.post_terminal_dropped += 1;
            trace!(
                timestamp = record.timestamp_nanos,
                "Dropping record received after the stream terminated"
            );
            return;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.stats.received += 1;
        state.queue.push(Reverse(BufferEntry {
            record,
            arrival: Instant::now(),
            seq,
        }));
        self.shared.ensure_flush_task(&mut state);
    }

    /// Records normal completion. It reaches the sink once the buffer has drained.
    pub fn on_complete(&self) {
        self.record_terminal(TerminalEvent::Completed);
    }

    /// Records a terminal failure. It reaches the sink once the buffer has drained.
    pub fn on_error(&self, error: StreamError) {
        self.record_terminal(TerminalEvent::Failed(error));
    }

    fn record_terminal(&self, event: TerminalEvent) {
        let mut state = self.shared.lock();
        if !matches!(state.lifecycle, Lifecycle::Open) {
            debug!("Ignoring terminal event {event:?}, stream already terminated");
            return;
        }
        debug!(
            buffered = state.queue.len(),
            "Terminal event recorded, draining buffer"
        );
        state.lifecycle = Lifecycle::Terminating(event);
        self.shared.ensure_flush_task(&mut state);
    }

    /// Drops all buffered records and stops flushing without notifying the sink.
    pub fn discard(&self) {
        let mut state = self.shared.lock();
        let discarded = state.queue.len();
        state.queue.clear();
        if let Some(task) = state.flush_task.take() {
            task.cancel();
        }
        state.lifecycle = Lifecycle::Closed;
        debug!(discarded, "Reorder buffer discarded");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.lock().queue.is_empty()
    }

    /// Whether a flush task is currently scheduled.
    #[must_use]
    pub fn is_flush_scheduled(&self) -> bool {
        self.shared.lock().flush_task.is_some()
    }

    /// Whether a terminal event was recorded or the buffer was discarded.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        !matches!(self.shared.lock().lifecycle, Lifecycle::Open)
    }

    #[must_use]
    pub fn stats(&self) -> BufferStats {
        self.shared.lock().stats
    }

    #[must_use]
    pub fn hold_window(&self) -> Duration {
        self.shared.hold_window
    }

    #[must_use]
    pub fn flush_period(&self) -> Duration {
        self.shared.flush_period
    }
}

impl std::fmt::Debug for ReorderBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReorderBuffer")
            .field("hold_window", &self.shared.hold_window)
            .field("flush_period", &self.shared.flush_period)
            .field("state", &self.shared.state)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_flush_task(self: &Arc<Self>, state: &mut BufferState) {
        if state.flush_task.is_some() {
            return;
        }
        let weak: Weak<Shared> = Arc::downgrade(self);
        let task = self.scheduler.schedule_repeating(
            self.hold_window,
            self.flush_period,
            Box::new(move |task| match weak.upgrade() {
                Some(shared) => shared.flush(task),
                None => task.cancel(),
            }),
        );
        trace!("Flush task scheduled");
        state.flush_task = Some(task);
    }

    /// One flush pass: release every record old enough, then either deliver the
    /// pending terminal event or park the task until the next arrival.
    fn flush(&self, task: &ScheduledTask) {
        if task.is_cancelled() {
            return;
        }

        loop {
            let released = {
                let mut state = self.lock();
                self.release_next(&mut state)
            };
            match released {
                Some(record) => self.sink.on_message(record),
                None => break,
            }
        }

        let terminal = {
            let mut state = self.lock();
            if !state.queue.is_empty() {
                return;
            }
            task.cancel();
            state.flush_task = None;
            match std::mem::replace(&mut state.lifecycle, Lifecycle::Closed) {
                Lifecycle::Terminating(event) => Some(event),
                other => {
                    state.lifecycle = other;
                    None
                }
            }
        };

        match terminal {
            Some(event) => {
                debug!("Reorder buffer drained, delivering terminal event");
                event.deliver(self.sink.as_ref());
            }
            None => trace!("Reorder buffer empty, flush task parked"),
        }
    }

    fn release_next(&self, state: &mut BufferState) -> Option<LogRecord> {
        loop {
            let old_enough = match state.queue.peek() {
                Some(Reverse(entry)) => entry.arrival.elapsed() >= self.hold_window,
                None => false,
            };
            if !old_enough {
                return None;
            }
            let Reverse(entry) = state.queue.pop()?;
            let timestamp = entry.record.timestamp_nanos;

            if let Some(last) = state.last_emitted {
                if timestamp < last {
                    state.stats.late_dropped += 1;
                    warn!(
                        timestamp,
                        last_emitted = last,
                        "Dropping late record, it arrived after newer records were released"
                    );
                    continue;
                }
            }
            state.last_emitted = Some(timestamp);
            state.stats.emitted += 1;
            return Some(entry.record);
        }
    }
}
