//! Operator wiring.
//!
//! Builds the template engine, stack driver and reconciler from the
//! configuration and runs the status poller together with the observation
//! consumer until shut down.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::OperatorConfig;
use crate::poller::{PollerHandle, StatusPoller};
use crate::reconciler::VmReconciler;
use crate::stack::{ADMIN_TENANT, ClientCache, OrchestrationBackend, StackRenderer, StackService, TenantSession};
use crate::store::ResourceStore;
use crate::templates::{TemplateEngine, TemplateError};

const OBSERVATION_QUEUE: usize = 16;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to load templates: {0}")]
    Template(#[from] TemplateError),

    #[error("failed to prepare scratch directory {}: {source}", .path.display())]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct Operator {
    reconciler: Arc<VmReconciler>,
    stacks: Arc<StackService>,
    poller: PollerHandle,
    consumer: JoinHandle<()>,
}

impl Operator {
    /// Load templates, build the driver and start background polling.
    ///
    /// `admin_session` is used for listing stacks and for driver calls
    /// without a spec.
    pub async fn start(
        config: &OperatorConfig,
        store: Arc<dyn ResourceStore>,
        backend: Arc<dyn OrchestrationBackend>,
        admin_session: TenantSession,
    ) -> Result<Self, StartError> {
        let engine = TemplateEngine::new();
        for (name, path) in config.templates.entries() {
            engine.register(name, path)?;
        }

        tokio::fs::create_dir_all(&config.scratch_dir)
            .await
            .map_err(|source| StartError::ScratchDir {
                path: config.scratch_dir.clone(),
                source,
            })?;

        let renderer = StackRenderer::new(Arc::new(engine), config.scratch_dir.clone());
        let clients = ClientCache::seeded(ADMIN_TENANT, admin_session);
        let stacks = Arc::new(StackService::new(backend, clients, renderer));
        let reconciler = Arc::new(VmReconciler::new(store, Arc::clone(&stacks)));

        let (observations_tx, observations_rx) = mpsc::channel(OBSERVATION_QUEUE);
        let consumer = tokio::spawn(Arc::clone(&reconciler).run_observations(observations_rx));
        let poller = StatusPoller::new(Arc::clone(&stacks), config.polling_period, observations_tx).spawn();

        info!(
            scratch_dir = %config.scratch_dir.display(),
            polling_period = ?config.polling_period,
            "Operator started"
        );

        Ok(Self {
            reconciler,
            stacks,
            poller,
            consumer,
        })
    }

    pub fn reconciler(&self) -> Arc<VmReconciler> {
        Arc::clone(&self.reconciler)
    }

    pub fn stacks(&self) -> Arc<StackService> {
        Arc::clone(&self.stacks)
    }

    /// Stop polling and wait for pending observations to drain.
    pub async fn shutdown(self) {
        self.poller.shutdown().await;
        if let Err(e) = self.consumer.await {
            error!(error = %e, "Observation consumer failed");
        }
        info!("Operator stopped");
    }
}
