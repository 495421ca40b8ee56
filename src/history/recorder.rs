use std::{sync::Arc, time::Duration};

use crate::{
    FlowlineError, Result, ShareLock,
    common::{Queue, Shutdown},
    history::{HistoryStore, SaveOutcome},
    model::{FlowSnapshot, NodeId},
};

const COMMAND_QUEUE_SIZE: usize = 1024;

enum HistoryCommand {
    Record(FlowSnapshot, Option<Vec<NodeId>>),
    Flush,
    Cancel,
}

/// Debounced front of a [`HistoryStore`].
///
/// Each `record` restarts the quiet period; only the latest snapshot of a
/// burst reaches the store. The worker runs on the current tokio runtime
/// until `shutdown` or drop.
pub struct HistoryRecorder {
    queue: Arc<Queue<HistoryCommand>>,
    shutdown: Arc<Shutdown>,
}

impl HistoryRecorder {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn start(
        store: ShareLock<HistoryStore>,
        debounce: Duration,
    ) -> Self {
        let queue = Queue::new(COMMAND_QUEUE_SIZE);
        let shutdown = Arc::new(Shutdown::new());

        let worker_queue = queue.clone();
        let worker_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut pending: Option<(FlowSnapshot, Option<Vec<NodeId>>)> = None;
            loop {
                let waiting = pending.is_some();
                let quiet = async move {
                    if waiting {
                        tokio::time::sleep(debounce).await
                    } else {
                        std::future::pending::<()>().await
                    }
                };

                tokio::select! {
                    _ = worker_shutdown.wait() => break,
                    _ = quiet => {
                        if let Some((snapshot, selection)) = pending.take() {
                            Self::capture(&store, snapshot, selection);
                        }
                    }
                    cmd = worker_queue.next_async() => match cmd {
                        Some(HistoryCommand::Record(snapshot, selection)) => pending = Some((snapshot, selection)),
                        Some(HistoryCommand::Flush) => {
                            if let Some((snapshot, selection)) = pending.take() {
                                Self::capture(&store, snapshot, selection);
                            }
                        }
                        Some(HistoryCommand::Cancel) => pending = None,
                        None => break,
                    },
                }
            }
            tracing::trace!("history recorder stopped");
        });

        Self {
            queue,
            shutdown,
        }
    }

    /// Schedule a capture of `snapshot` after the quiet period.
    pub fn record(
        &self,
        snapshot: FlowSnapshot,
        selection: Option<Vec<NodeId>>,
    ) -> Result<()> {
        self.send(HistoryCommand::Record(snapshot, selection))
    }

    /// Capture the pending snapshot now.
    pub fn flush(&self) -> Result<()> {
        self.send(HistoryCommand::Flush)
    }

    /// Drop the pending snapshot.
    pub fn cancel(&self) -> Result<()> {
        self.send(HistoryCommand::Cancel)
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_terminated()
    }

    /// Commands sent after shutdown would never be served.
    fn send(
        &self,
        command: HistoryCommand,
    ) -> Result<()> {
        if self.is_stopped() {
            return Err(FlowlineError::History("history recorder is stopped".to_string()));
        }
        self.queue.send(command)
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    fn capture(
        store: &ShareLock<HistoryStore>,
        snapshot: FlowSnapshot,
        selection: Option<Vec<NodeId>>,
    ) -> SaveOutcome {
        match store.write() {
            Ok(mut history) => {
                let outcome = history.save_state(&snapshot.nodes, &snapshot.edges, selection);
                tracing::debug!(outcome = outcome.as_ref(), "debounced history capture");
                outcome
            }
            Err(err) => {
                tracing::warn!(error = %err, "history store lock poisoned");
                SaveOutcome::Failed
            }
        }
    }
}

impl Drop for HistoryRecorder {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}
