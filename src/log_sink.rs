//! A [`log::Log`] backend that ships every record to the simulator as a
//! `LOG_WRITE` event instead of printing it.
//!
//! stderr on the node's host has no meaning inside the simulated network —
//! the simulator is the log consumer, so it gets every line the same way
//! `otPlatLog` hands its formatted string to `otSimSendLogWriteEvent`: one
//! line, trailing `\n`, sent as an event with zero delay.

use std::sync::Mutex;

use log::{Level, Log, Metadata, Record};

use crate::error::NodeError;
use crate::event::event_type;
use crate::transport::Transport;

/// Forwards formatted log lines to a [`Transport`] as `LOG_WRITE` events.
///
/// The transport is behind a `Mutex` since `log::Log` requires `Sync` but
/// the node's transport is otherwise owned exclusively by the single
/// event-loop thread.
pub struct SimLogger<T> {
    transport: Mutex<T>,
    level: Level,
}

impl<T: Transport + Send> SimLogger<T> {
    pub fn new(transport: T, level: Level) -> Self {
        SimLogger {
            transport: Mutex::new(transport),
            level,
        }
    }

    /// Installs this logger as the global `log` backend and sets the crate's
    /// max-level filter to match. Must be called at most once per process.
    pub fn install(self) -> Result<(), log::SetLoggerError>
    where
        T: 'static,
    {
        log::set_max_level(self.level.to_level_filter());
        log::set_boxed_logger(Box::new(self))
    }

    fn send_line(&self, line: &str) -> Result<(), NodeError> {
        let mut transport = self.transport.lock().expect("log transport mutex poisoned");
        transport.send(event_type::LOG_WRITE, 0, 0, line.as_bytes())
    }
}

impl<T: Transport + Send> Log for SimLogger<T> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{} {}\n", record.level(), record.args());
        // A failed log send has no fallback channel; dropping it here keeps
        // logging from being able to crash the node.
        let _ = self.send_line(&line);
    }

    fn flush(&self) {}
}
