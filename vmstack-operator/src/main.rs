//! vmstack-operator: offline tooling for the VirtualMachine stack operator.
//!
//! The resource store and orchestration backend are provided by the hosting
//! controller runtime. This binary exercises the parts of the operator that
//! work without them:
//! - `check` loads the configured templates and polling period
//! - `render` renders the stack templates for a spec into the scratch dir
//! - `validate` runs the create or update validator on a spec

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vmstack_operator::config::{
    DEFAULT_POLLING_PERIOD, DEFAULT_SCRATCH_DIR, OperatorConfig, TemplatePaths, parse_polling_period,
};
use vmstack_operator::resource::VirtualMachineSpec;
use vmstack_operator::stack::{StackRenderer, valid_spec, valid_update_spec};
use vmstack_operator::templates::{TemplateEngine, flatten_spec};

/// VirtualMachine stack operator
#[derive(Parser, Debug)]
#[command(name = "vmstack-operator", version, about)]
struct Args {
    /// Network template file
    #[arg(long, default_value = "templates/network.yaml")]
    net_tpl_file: PathBuf,

    /// Server template file
    #[arg(long, default_value = "templates/vm.yaml")]
    vm_tpl_file: PathBuf,

    /// Group (entry point) template file
    #[arg(long, default_value = "templates/vm_group.yaml")]
    vmg_tpl_file: PathBuf,

    /// Directory rendered templates are written to
    #[arg(long, default_value = DEFAULT_SCRATCH_DIR)]
    tmp_dir: PathBuf,

    /// Stack status polling period (e.g. 5s, 1m)
    #[arg(long, default_value = DEFAULT_POLLING_PERIOD)]
    polling_period: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the templates and configuration, then exit
    Check,
    /// Render the stack templates for a spec
    Render {
        /// VirtualMachineSpec as a JSON file
        #[arg(long)]
        spec: PathBuf,
    },
    /// Validate a spec, as an update of --prior when given
    Validate {
        /// VirtualMachineSpec as a JSON file
        #[arg(long)]
        spec: PathBuf,

        /// Previously accepted VirtualMachineSpec as a JSON file
        #[arg(long)]
        prior: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmstack_operator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = OperatorConfig {
        templates: TemplatePaths {
            network: args.net_tpl_file,
            server: args.vm_tpl_file,
            group: args.vmg_tpl_file,
        },
        scratch_dir: args.tmp_dir,
        polling_period: parse_polling_period(&args.polling_period)?,
    };

    match args.command {
        Command::Check => {
            let engine = load_templates(&config)?;
            info!(
                templates = ?engine.names(),
                polling_period = ?config.polling_period,
                "Configuration OK"
            );
        }
        Command::Render { spec } => {
            let spec = read_spec(&spec)?;
            let engine = load_templates(&config)?;
            tokio::fs::create_dir_all(&config.scratch_dir)
                .await
                .with_context(|| format!("Failed to create {}", config.scratch_dir.display()))?;

            let renderer = StackRenderer::new(Arc::new(engine), config.scratch_dir.clone());
            let params = flatten_spec(Some(&spec)).context("Failed to build template parameters")?;
            let bundle = renderer.render(&params).await.context("Failed to render templates")?;
            for locator in bundle.files.keys() {
                info!(file = %locator, "Rendered");
            }
            println!("{}", bundle.entry);
        }
        Command::Validate { spec, prior } => {
            let next = read_spec(&spec)?;
            match prior {
                Some(prior) => {
                    let prior = read_spec(&prior)?;
                    valid_update_spec(&prior, &next).context("Update rejected")?;
                }
                None => valid_spec(&next).context("Spec rejected")?,
            }
            println!("ok");
        }
    }

    Ok(())
}

fn load_templates(config: &OperatorConfig) -> Result<TemplateEngine> {
    let engine = TemplateEngine::new();
    for (name, path) in config.templates.entries() {
        engine
            .register(name, path)
            .with_context(|| format!("Failed to load template {}", name))?;
    }
    Ok(engine)
}

fn read_spec(path: &Path) -> Result<VirtualMachineSpec> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("Failed to parse {}", path.display()))
}
