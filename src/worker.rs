//! Analysis worker thread
//!
//! Decoding is CPU-bound and synchronous, so an interactive shell runs
//! it off its responsiveness path. The worker owns one
//! [`AnalysisSession`] on its own thread and talks to the shell over
//! bounded crossbeam channels:
//!
//! - [`AnalysisCommand`] - shell to worker (analyze, symbol table, shutdown)
//! - [`AnalysisEvent`] - worker to shell (records, failures)
//!
//! Cancellation is just discarding the result: decoders are pure and
//! buffers are read-only, so there is never a partial side effect to
//! undo. Dropping the handle shuts the worker down.

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::pipeline::AnalysisSession;
use crate::symbols::SymbolTable;
use crate::types::{RawTrace, TraceRecord};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Channel capacity between shell and worker
const CHANNEL_CAPACITY: usize = 64;

/// Message sent from the shell to the worker
#[derive(Debug)]
pub enum AnalysisCommand {
    /// Decode one capture; the id ties the eventual event back to the
    /// request
    Analyze {
        /// Caller-chosen request id
        id: u64,
        /// The capture to decode
        trace: RawTrace,
    },
    /// Attach or replace the session's symbol table
    SetSymbolTable(Arc<SymbolTable>),
    /// Stop the worker
    Shutdown,
}

/// Message sent from the worker to the shell
#[derive(Debug)]
pub enum AnalysisEvent {
    /// A capture decoded successfully
    RecordReady {
        /// Request id from the matching command
        id: u64,
        /// The decoded record
        record: Box<TraceRecord>,
    },
    /// A capture failed to decode
    AnalysisFailed {
        /// Request id from the matching command
        id: u64,
        /// Rendered error for display
        error: String,
    },
}

/// Shell-side handle to a running worker
#[derive(Debug)]
pub struct WorkerHandle {
    commands: Sender<AnalysisCommand>,
    events: Receiver<AnalysisEvent>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Queue a capture for analysis; false when the worker is gone
    pub fn analyze(&self, id: u64, trace: RawTrace) -> bool {
        self.commands
            .send(AnalysisCommand::Analyze { id, trace })
            .is_ok()
    }

    /// Attach or replace the worker session's symbol table
    pub fn set_symbol_table(&self, table: Arc<SymbolTable>) -> bool {
        self.commands
            .send(AnalysisCommand::SetSymbolTable(table))
            .is_ok()
    }

    /// Drain all events currently queued, without blocking
    pub fn drain(&self) -> Vec<AnalysisEvent> {
        self.events.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AnalysisEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Stop the worker and wait for it to finish
    pub fn shutdown(mut self) {
        let _ = self.commands.send(AnalysisCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(AnalysisCommand::Shutdown);
    }
}

/// The worker loop: one session, one thread
pub struct AnalysisWorker {
    session: AnalysisSession,
    commands: Receiver<AnalysisCommand>,
    events: Sender<AnalysisEvent>,
}

impl AnalysisWorker {
    /// Build the session up front and spawn the worker thread
    ///
    /// Configuration errors surface here, on the caller's thread, not
    /// inside the worker.
    pub fn spawn(config: AnalysisConfig) -> Result<WorkerHandle> {
        let session = AnalysisSession::new(config)?;
        let (cmd_tx, cmd_rx) = bounded(CHANNEL_CAPACITY);
        let (evt_tx, evt_rx) = bounded(CHANNEL_CAPACITY);
        let worker = AnalysisWorker {
            session,
            commands: cmd_rx,
            events: evt_tx,
        };
        let thread = std::thread::Builder::new()
            .name("firmtrace-analysis".into())
            .spawn(move || worker.run())?;
        Ok(WorkerHandle {
            commands: cmd_tx,
            events: evt_rx,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        tracing::info!("analysis worker started");
        while let Ok(command) = self.commands.recv() {
            match command {
                AnalysisCommand::Analyze { id, trace } => {
                    let event = match self.session.analyze(&trace) {
                        Ok(record) => AnalysisEvent::RecordReady {
                            id,
                            record: Box::new(record),
                        },
                        Err(e) => {
                            tracing::warn!(id, error = %e, "analysis failed");
                            AnalysisEvent::AnalysisFailed {
                                id,
                                error: e.to_string(),
                            }
                        }
                    };
                    if self.events.send(event).is_err() {
                        // Shell went away; results have nowhere to go
                        break;
                    }
                }
                AnalysisCommand::SetSymbolTable(table) => {
                    self.session.set_symbol_table(table);
                }
                AnalysisCommand::Shutdown => break,
            }
        }
        tracing::info!("analysis worker stopped");
    }
}
