// ==============================================================================
// main.rs - Varwig Command-Line Entry Point
// ==============================================================================
// Description: Runs engine operations for one peak or variant from the shell
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Usage:
//   varwig values  --peak peak.json
//   varwig tracks  --peak peak.json
//   varwig plot    --peak peak.json --output peak.svg
//   varwig resolve --chrom chr1 --position 1234567
//
// Configuration comes from VARWIG_* environment variables (see config.rs).
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use varwig_engine::models::GenotypeClass;
use varwig_engine::{EngineConfig, EngineContext, Peak};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Merge-cache directory (overrides VARWIG_MERGED_TRACKS_DIR)
    #[arg(long, env = "VARWIG_MERGED_TRACKS_DIR")]
    merged_tracks_dir: Option<PathBuf>,

    /// Values cache (overrides VARWIG_REDIS_URL)
    #[arg(long, env = "VARWIG_REDIS_URL")]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Group statistics for a peak (JSON)
    Values {
        /// Peak description (JSON)
        #[arg(short, long)]
        peak: PathBuf,
    },

    /// Merged tracks per condition and genotype (JSON)
    Tracks {
        #[arg(short, long)]
        peak: PathBuf,
    },

    /// Box plots for a peak (SVG)
    Plot {
        #[arg(short, long)]
        peak: PathBuf,

        /// Write the SVG here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Genotype counts at a variant
    Resolve {
        #[arg(short, long)]
        chrom: String,

        /// 1-based position
        #[arg(short, long)]
        position: u64,
    },
}

/// Genotype summary printed by `resolve` (counts only, no sample IDs)
#[derive(Serialize)]
struct ResolveSummary {
    chrom: String,
    position: u64,
    samples: usize,
    #[serde(rename = "REF")]
    hom_ref: usize,
    #[serde(rename = "HET")]
    het: usize,
    #[serde(rename = "HOM")]
    hom_alt: usize,
}

fn load_peak(path: &PathBuf) -> Result<Peak> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read peak file {:?}", path))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid peak description in {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (stderr keeps stdout clean for results)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "varwig_engine=info,varwig=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::from_env().context("Invalid VARWIG_* configuration")?;
    if let Some(dir) = args.merged_tracks_dir {
        config.merged_tracks_dir = dir;
    }
    if let Some(url) = args.redis_url {
        config.redis_url = Some(url);
    }

    info!("Varwig engine starting...");
    let engine = EngineContext::open(config)
        .await
        .context("Failed to open engine")?;

    let result = run(&engine, args.command).await;
    engine.close().await;
    result
}

async fn run(engine: &EngineContext, command: Command) -> Result<()> {
    match command {
        Command::Values { peak } => {
            let peak = load_peak(&peak)?;
            let stats = engine.values(&peak).await?;
            print_json(&stats)
        }
        Command::Tracks { peak } => {
            let peak = load_peak(&peak)?;
            let tracks = engine.tracks(&peak).await?;
            print_json(&tracks)
        }
        Command::Plot { peak, output } => {
            let peak = load_peak(&peak)?;
            let svg = engine.plot(&peak).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, svg)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!("Plot written to {:?}", path);
                }
                None => println!("{}", svg),
            }
            Ok(())
        }
        Command::Resolve { chrom, position } => {
            let genotypes = engine.resolve(&chrom, position).await?;
            let count = |class: GenotypeClass| genotypes.values().filter(|g| g.class == class).count();

            print_json(&ResolveSummary {
                samples: genotypes.len(),
                hom_ref: count(GenotypeClass::Ref),
                het: count(GenotypeClass::Het),
                hom_alt: count(GenotypeClass::Hom),
                chrom,
                position,
            })
        }
    }
}
