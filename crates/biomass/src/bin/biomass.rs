use std::path::{Path, PathBuf};

use biomass::job::AnalysisJob;
use biomass::estimate::SpeciesProfile;
use biomass::{join_image_paths, AggregateResult, SpeciesCatalog};
use clap::{Parser, Subcommand};

#[cfg(not(feature = "tracing"))]
use log::{info, LevelFilter};
#[cfg(feature = "tracing")]
use tracing::info;

#[cfg(feature = "tracing")]
use biomass::core::init_tracing;
#[cfg(not(feature = "tracing"))]
use biomass::core::init_with_level;

#[derive(Debug, Parser)]
#[command(name = "biomass", version, about = "Estimate biomass from segmentation masks")]
struct Cli {
    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit JSON logs (only with the `tracing` feature).
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an analysis job described by a JSON file.
    Run {
        job: PathBuf,
        /// Write the report here (overrides the job's `output_path`).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write overlay PNGs here (overrides the job's `overlay_dir`).
        #[arg(long)]
        overlay_dir: Option<PathBuf>,
    },
    /// Species summary from detector counts, e.g. `rohu=3 catla=1`.
    Count {
        #[arg(required = true, value_parser = parse_count)]
        counts: Vec<(String, u32)>,
        /// Custom species catalog JSON.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// List the species catalog.
    Species {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

fn parse_count(raw: &str) -> Result<(String, u32), String> {
    let (name, n) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected SPECIES=COUNT, got '{raw}'"))?;
    let n = n
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("bad count in '{raw}': {e}"))?;
    Ok((name.trim().to_string(), n))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match cli.command {
        Command::Run {
            job,
            output,
            overlay_dir,
        } => run(&job, output, overlay_dir),
        Command::Count { counts, catalog } => count(&counts, catalog.as_deref()),
        Command::Species { catalog } => species(catalog.as_deref()),
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_with_level(level)?;
    if cli.json_logs {
        log::warn!("--json-logs needs the `tracing` feature, using plain logs");
    }
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(cli.json_logs);
    if cli.verbose {
        info!("--verbose is ignored with tracing, set RUST_LOG=debug instead");
    }
    Ok(())
}

fn run(
    job_path: &Path,
    output: Option<PathBuf>,
    overlay_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut job = AnalysisJob::load_json(job_path)?;
    if output.is_some() {
        job.output_path = output;
    }
    if overlay_dir.is_some() {
        job.overlay_dir = overlay_dir;
    }
    info!("running job {}", job_path.display());

    let out = job.execute()?;
    if job.output_path.is_none() {
        println!("{}", serde_json::to_string_pretty(&out.report)?);
    }
    println!("{}", out.report.title());
    println!("{}", out.report.display_text());
    if !out.overlay_paths.is_empty() {
        println!("{}", join_image_paths(&out.overlay_paths));
    }
    Ok(())
}

fn load_catalog(path: Option<&Path>) -> Result<SpeciesCatalog, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(p) => SpeciesCatalog::from_json(&std::fs::read_to_string(p)?)?,
        None => SpeciesCatalog::builtin(),
    })
}

fn count(counts: &[(String, u32)], catalog: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(catalog)?;
    let summary = AggregateResult::from_counts(&catalog, counts);
    for s in &summary.species {
        println!(
            "{}: {} ({:.0}g, {:.1}%)",
            s.species,
            s.count,
            s.total_weight,
            s.share_of(summary.total_weight)
        );
    }
    println!(
        "Total: {:.0}g, {:.0}cm³",
        summary.total_weight, summary.total_volume
    );
    Ok(())
}

fn species(catalog: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(catalog)?;
    for (name, p) in catalog.iter() {
        println!("{name}: {}", profile_line(p));
    }
    println!("default: {}", profile_line(catalog.default_profile()));
    Ok(())
}

fn profile_line(p: &SpeciesProfile) -> String {
    format!(
        "a={} b={} ratio={} avg_weight={}g avg_volume={}cm³",
        p.a, p.b, p.cross_section_ratio, p.avg_weight, p.avg_volume
    )
}
