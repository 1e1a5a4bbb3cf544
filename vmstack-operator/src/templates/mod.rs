//! Template engine for stack documents.
//!
//! Templates are registered under a logical name and parsed from disk.
//! Each render stats the backing file and re-parses it when its modification
//! time differs from the one recorded at the last parse, so template sources
//! can be edited without restarting the operator. All registrations and
//! renders go through one engine-wide lock.

pub mod params;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use minijinja::{AutoEscape, Environment, Output, State, Value};
use thiserror::Error;
use tracing::{debug, info};

pub use params::{ParamValue, TemplateParams, flatten_document, flatten_spec};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {0} is not registered")]
    Unknown(String),

    #[error("failed to read template {name} from {}: {source}", .path.display())]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse template {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render template {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

struct TemplateFile {
    path: PathBuf,
    modified: SystemTime,
}

struct EngineState {
    env: Environment<'static>,
    files: HashMap<String, TemplateFile>,
}

pub struct TemplateEngine {
    state: Mutex<EngineState>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.set_formatter(format_value);
        env.add_filter("to_char", to_char);

        Self {
            state: Mutex::new(EngineState {
                env,
                files: HashMap::new(),
            }),
        }
    }

    /// Parse `path` and register it as `name`, replacing any previous registration.
    pub fn register(&self, name: &str, path: impl AsRef<Path>) -> Result<(), TemplateError> {
        let path = path.as_ref();
        let mut state = self.lock();

        if state.files.contains_key(name) {
            info!(name = %name, "Replacing template");
        }
        let modified = load(&mut state.env, name, path)?;
        state.files.insert(
            name.to_string(),
            TemplateFile {
                path: path.to_path_buf(),
                modified,
            },
        );

        info!(name = %name, path = %path.display(), "Registered template");
        Ok(())
    }

    /// Render `name` with `params`, re-parsing the source first if it changed on disk.
    ///
    /// Does blocking file I/O under the engine lock; async callers run it on
    /// the blocking pool.
    pub fn render(&self, name: &str, params: &TemplateParams) -> Result<Vec<u8>, TemplateError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let file = state
            .files
            .get_mut(name)
            .ok_or_else(|| TemplateError::Unknown(name.to_string()))?;

        let modified = modified_time(name, &file.path)?;
        if modified != file.modified {
            debug!(name = %name, path = %file.path.display(), "Template changed on disk, reloading");
            file.modified = load(&mut state.env, name, &file.path)?;
        }

        let template = state
            .env
            .get_template(name)
            .map_err(|_| TemplateError::Unknown(name.to_string()))?;
        let rendered = template.render(params).map_err(|source| TemplateError::Render {
            name: name.to_string(),
            source,
        })?;

        Ok(rendered.into_bytes())
    }

    /// Names of all registered templates.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().files.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn modified_time(name: &str, path: &Path) -> Result<SystemTime, TemplateError> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| TemplateError::Io {
            name: name.to_string(),
            path: path.to_path_buf(),
            source,
        })
}

/// Parse the file into `env`, returning the modification time it was parsed at.
fn load(env: &mut Environment<'static>, name: &str, path: &Path) -> Result<SystemTime, TemplateError> {
    let modified = modified_time(name, path)?;
    let source = fs::read_to_string(path).map_err(|source| TemplateError::Io {
        name: name.to_string(),
        path: path.to_path_buf(),
        source,
    })?;
    env.add_template_owned(name.to_string(), source)
        .map_err(|source| TemplateError::Parse {
            name: name.to_string(),
            source,
        })?;
    Ok(modified)
}

// Nulls render as nothing.
fn format_value(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), minijinja::Error> {
    if value.is_none() || value.is_undefined() {
        return Ok(());
    }
    minijinja::escape_formatter(out, state, value)
}

/// `{{ 98 | to_char }}` renders `b`. Strings pass through unchanged.
fn to_char(value: Value) -> String {
    if let Some(s) = value.as_str() {
        return s.to_string();
    }
    i64::try_from(value)
        .ok()
        .and_then(|n| u32::try_from(n).ok())
        .and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_default()
}
