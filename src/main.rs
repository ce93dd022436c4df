//! Shapedelta command line
//!
//! `evaluate` runs a geometry graph through the pipeline and prints the
//! response delta. `merge` folds a delta into a consumer cache file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use shapedelta::{
    ConsumerCache, DisplayInfo, DisplayPipeline, GeometryGraph, HashCache, PipelineConfig, ResponseDelta,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shapedelta")]
#[command(about = "Incremental mesh recomputation for parametric geometry graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a geometry graph and print the response delta
    Evaluate {
        /// Geometry graph JSON file
        graph: PathBuf,

        /// Display info from the previous response, used to decide reuse
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Pipeline configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Merge a response delta into a consumer cache file
    Merge {
        /// Consumer cache JSON file, created when missing
        cache: PathBuf,

        /// Response delta JSON file
        delta: PathBuf,

        /// Merges an entry survives without being refreshed; overrides the config
        #[arg(long)]
        max_age: Option<u64>,

        /// Pipeline configuration JSON file, read for its merge section
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    Ok(match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    })
}

fn evaluate(graph: &Path, previous: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let graph: GeometryGraph = read_json(graph)?;
    let previous = match previous {
        Some(path) => {
            let display_info: BTreeMap<String, DisplayInfo> = read_json(path)?;
            HashCache::from_display_info(&display_info)
        }
        None => HashCache::new(),
    };

    let pipeline = DisplayPipeline::from_config(&config);
    let response = pipeline.evaluate(&graph, &previous)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn merge(cache_path: &Path, delta: &Path, max_age: Option<u64>, config: Option<&Path>) -> Result<()> {
    let options = load_config(config)?.merge_options(max_age);
    let cache: ConsumerCache = if cache_path.exists() {
        read_json(cache_path)?
    } else {
        info!("Starting a new cache at {}", cache_path.display());
        ConsumerCache::default()
    };
    let delta: ResponseDelta = read_json(delta)?;

    let (merged, statistics) = cache.merge_delta(&delta, options);
    let json = serde_json::to_string_pretty(&merged)?;
    std::fs::write(cache_path, json).with_context(|| format!("Failed to write {}", cache_path.display()))?;

    println!("{}", serde_json::to_string_pretty(&statistics)?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_module("rhai", log::LevelFilter::Warn)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            graph,
            previous,
            config,
        } => evaluate(&graph, previous.as_deref(), config.as_deref())?,
        Commands::Merge {
            cache,
            delta,
            max_age,
            config,
        } => merge(&cache, &delta, max_age, config.as_deref())?,
    }

    Ok(())
}
