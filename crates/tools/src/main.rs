use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use catalog::InMemoryCatalog;
use clap::{Parser, Subcommand, ValueEnum};
use foundation::Diagnostics;
use layers::CatalogFilter;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tree::{PortalConfig, Sequences, build_portal_layers};

#[derive(Parser)]
#[command(name = "layertree", about = "Builds portal layer trees from a layer catalog")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the configured sections and print the resulting trees.
    Build {
        #[command(flatten)]
        inputs: Inputs,
        /// Category key to group the auto tree by.
        #[arg(long)]
        category: Option<String>,
        /// Print only one section.
        #[arg(long, value_enum)]
        section: Option<Section>,
        #[arg(long)]
        pretty: bool,
    },
    /// Print the flat catalog slice the auto tree is built from.
    Filter {
        #[command(flatten)]
        inputs: Inputs,
        /// Keep only the first dataset of multi-dataset layers.
        #[arg(long)]
        no_split: bool,
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(clap::Args)]
struct Inputs {
    /// Layer catalog (`services.json`).
    #[arg(long, env = "LAYERTREE_SERVICES")]
    services: PathBuf,
    /// Portal configuration (`config.json`).
    #[arg(long, env = "LAYERTREE_CONFIG")]
    config: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Section {
    Baselayer,
    Subjectlayer,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Build {
            inputs,
            category,
            section,
            pretty,
        } => cmd_build(&inputs, category.as_deref(), section, pretty),
        Command::Filter {
            inputs,
            no_split,
            pretty,
        } => cmd_filter(&inputs, !no_split, pretty),
    }
}

fn cmd_build(
    inputs: &Inputs,
    category: Option<&str>,
    section: Option<Section>,
    pretty: bool,
) -> Result<()> {
    let mut diagnostics = Diagnostics::new();
    let catalog = load_catalog(&inputs.services, &mut diagnostics)?;
    let mut config = load_config(&inputs.config)?;
    if let Some(key) = category {
        config.activate_category(key);
    }

    let mut sequences = Sequences::default();
    let portal = build_portal_layers(&catalog, &config, &mut sequences, &mut diagnostics);
    info!(
        "built trees: {} base layers, {} subject layers, {} warnings",
        portal.baselayer.layers().len(),
        portal.subjectlayer.layers().len(),
        diagnostics.warnings().len()
    );

    let value = match section {
        None => serde_json::to_value(&portal)?,
        Some(Section::Baselayer) => serde_json::to_value(&portal.baselayer)?,
        Some(Section::Subjectlayer) => serde_json::to_value(&portal.subjectlayer)?,
    };
    print_json(&value, pretty)
}

fn cmd_filter(inputs: &Inputs, respect_dataset_splitting: bool, pretty: bool) -> Result<()> {
    let mut diagnostics = Diagnostics::new();
    let catalog = load_catalog(&inputs.services, &mut diagnostics)?;
    let config = load_config(&inputs.config)?;

    let layers =
        CatalogFilter::new(&catalog).filter(&config.tree().auto_tree, respect_dataset_splitting);
    info!("{} of {} catalog layers selected", layers.len(), catalog.len());
    print_json(&serde_json::to_value(&layers)?, pretty)
}

fn load_catalog(path: &Path, diagnostics: &mut Diagnostics) -> Result<InMemoryCatalog> {
    InMemoryCatalog::load(path, diagnostics).with_context(|| format!("load catalog {path:?}"))
}

fn load_config(path: &Path) -> Result<PortalConfig> {
    PortalConfig::load(path).with_context(|| format!("load config {path:?}"))
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    let mut out = std::io::stdout().lock();
    writeln!(out, "{payload}")?;
    Ok(())
}
