//! Rendering of the stack template bundle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::backend::StackTemplate;
use super::error::StackError;
use crate::templates::{TemplateEngine, TemplateParams};

/// Logical template names, in render order. The last one is the entry point.
pub const NETWORK_TEMPLATE: &str = "network.yaml";
pub const SERVER_TEMPLATE: &str = "vm.yaml";
pub const GROUP_TEMPLATE: &str = "vm_group.yaml";

const BUNDLE: [&str; 3] = [NETWORK_TEMPLATE, SERVER_TEMPLATE, GROUP_TEMPLATE];

/// File-scheme locator for a document in the scratch directory.
pub fn locator(dir: &Path, name: &str) -> String {
    format!("file://{}", dir.join(name).display())
}

/// Renders the bundle into the scratch directory.
///
/// Renders are serialized: all documents share fixed file names in one
/// directory. The lock covers only template execution and local writes.
pub struct StackRenderer {
    engine: Arc<TemplateEngine>,
    scratch_dir: PathBuf,
    lock: Mutex<()>,
}

impl StackRenderer {
    pub fn new(engine: Arc<TemplateEngine>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            scratch_dir: scratch_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub async fn render(&self, params: &TemplateParams) -> Result<StackTemplate, StackError> {
        let _guard = self.lock.lock().await;

        // The engine stats and reads template sources from disk.
        let engine = Arc::clone(&self.engine);
        let task_params = params.clone();
        let bodies = tokio::task::spawn_blocking(move || {
            BUNDLE
                .iter()
                .map(|name| engine.render(name, &task_params).map(|body| (*name, body)))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| StackError::RenderTask(e.to_string()))??;

        let mut files = BTreeMap::new();
        for (name, body) in bodies {
            let path = self.scratch_dir.join(name);
            tokio::fs::write(&path, &body)
                .await
                .map_err(|source| StackError::Write { path: path.clone(), source })?;
            debug!(template = %name, path = %path.display(), bytes = body.len(), "Rendered template");
            files.insert(locator(&self.scratch_dir, name), body);
        }

        Ok(StackTemplate {
            entry: locator(&self.scratch_dir, GROUP_TEMPLATE),
            files,
        })
    }
}
