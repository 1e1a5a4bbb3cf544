//! Background status poller.
//!
//! Every period the poller lists the operator's stacks and hands each one to
//! the observation consumer over a channel, waiting for the consumer's ack
//! before sending the next. A failed ack aborts the rest of that tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::stack::{StackError, StackService, StatStack};
use crate::store::StoreError;

/// One listed stack awaiting application.
#[derive(Debug)]
pub struct StackObservation {
    pub stack: StatStack,
    pub ack: oneshot::Sender<Result<(), StoreError>>,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    List(#[from] StackError),

    #[error("failed to apply observation of stack {name}: {source}")]
    Observe {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("observation consumer is gone")]
    Closed,
}

pub struct StatusPoller {
    stacks: Arc<StackService>,
    period: Duration,
    observations: mpsc::Sender<StackObservation>,
}

impl StatusPoller {
    pub fn new(stacks: Arc<StackService>, period: Duration, observations: mpsc::Sender<StackObservation>) -> Self {
        Self {
            stacks,
            period,
            observations,
        }
    }

    /// Run a single poll. Returns the number of observations applied.
    pub async fn poll_once(&self) -> Result<usize, PollError> {
        let stacks = self.stacks.list().await?;

        let mut applied = 0;
        for stack in stacks {
            let name = stack.name.clone();
            let (ack, done) = oneshot::channel();
            self.observations
                .send(StackObservation { stack, ack })
                .await
                .map_err(|_| PollError::Closed)?;

            match done.await {
                Ok(Ok(())) => applied += 1,
                Ok(Err(source)) => return Err(PollError::Observe { name, source }),
                Err(_) => return Err(PollError::Closed),
            }
        }

        Ok(applied)
    }

    /// Spawn the poll loop. It exits between ticks once the handle is shut
    /// down or the observation consumer goes away.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            info!(period = ?self.period, "Status poller started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Status poller shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(self.period) => {
                        let started = Instant::now();
                        match self.poll_once().await {
                            Ok(applied) => debug!(applied, "Poll complete"),
                            Err(PollError::Closed) => {
                                warn!("Observation consumer closed, stopping status poller");
                                break;
                            }
                            Err(e) => error!(error = %e, "Poll failed"),
                        }

                        let elapsed = started.elapsed();
                        if elapsed > self.period {
                            warn!(elapsed = ?elapsed, period = ?self.period, "Poll took longer than the polling period");
                        }
                    }
                }
            }
        });

        PollerHandle { shutdown_tx, task }
    }
}

pub struct PollerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the loop and wait for it. An in-flight poll runs to completion.
    pub async fn shutdown(self) {
        drop(self.shutdown_tx);
        if let Err(e) = self.task.await {
            error!(error = %e, "Status poller task failed");
        }
    }
}
