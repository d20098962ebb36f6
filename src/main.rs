use anyhow::Result;
use clap::Parser;
use mortality_trends::ingestion;
use mortality_trends::pipeline::{self, PipelineConfig};
use mortality_trends::report;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "mortality-trends")]
#[command(about = "Derived-view pipeline for the state mortality dataset")]
struct Args {
    /// Path to the raw CSV snapshot
    input: PathBuf,

    /// Entity whose coverage ratios are computed
    #[arg(short, long, default_value = "District of Columbia")]
    entity: String,

    /// Number of leading causes to keep
    #[arg(short = 'n', long, default_value_t = 10)]
    top_n: usize,

    /// Write the JSON artifact bundle to this path instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!("Loading raw dataset from {}", args.input.display());

    let raw = ingestion::load_csv(&args.input)?;

    let config = PipelineConfig {
        top_n: args.top_n,
        anomaly_entity: args.entity,
        ..PipelineConfig::default()
    };
    let artifacts = pipeline::run(raw, &config)?;

    let bundle = report::artifacts_to_json(&artifacts)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, serde_json::to_string_pretty(&bundle)?)?;
            info!("Wrote artifact bundle to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&bundle)?),
    }

    Ok(())
}
