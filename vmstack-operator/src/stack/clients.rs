//! Tenant-keyed cache of authenticated backend handles.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientCacheError {
    #[error("no client cached for tenant {0}")]
    NotFound(String),
}

/// Lazily populated map from tenant id to handle.
///
/// Authentication runs outside the lock. Two callers racing on the same
/// missing tenant both authenticate and the last insert wins. Entries are
/// never evicted or refreshed.
pub struct ClientCache<H> {
    clients: Arc<RwLock<HashMap<String, H>>>,
}

impl<H: Clone> ClientCache<H> {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cache pre-populated with one handle, typically the admin session.
    pub fn seeded(tenant_id: impl Into<String>, handle: H) -> Self {
        let mut clients = HashMap::new();
        clients.insert(tenant_id.into(), handle);
        Self {
            clients: Arc::new(RwLock::new(clients)),
        }
    }

    pub async fn get(&self, tenant_id: &str) -> Result<H, ClientCacheError> {
        self.clients
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| ClientCacheError::NotFound(tenant_id.to_string()))
    }

    /// Return the cached handle or build one with `connect` and cache it.
    pub async fn get_or_create<F, Fut, E>(&self, tenant_id: &str, connect: F) -> Result<H, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H, E>>,
    {
        if let Ok(handle) = self.get(tenant_id).await {
            return Ok(handle);
        }

        debug!(tenant = %tenant_id, "No cached client, authenticating");
        let handle = connect().await?;
        self.insert(tenant_id, handle.clone()).await;
        Ok(handle)
    }

    pub async fn insert(&self, tenant_id: &str, handle: H) {
        self.clients.write().await.insert(tenant_id.to_string(), handle);
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl<H: Clone> Default for ClientCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for ClientCache<H> {
    fn clone(&self) -> Self {
        Self {
            clients: Arc::clone(&self.clients),
        }
    }
}
