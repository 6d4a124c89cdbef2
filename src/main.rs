//! tsdata - synthetic time-series generator and loader
//!
//! Usage:
//!   tsdata generate --entities 3 --mode missing-entity --output series.json
//!   tsdata ingest --dataset uniform --samples 2500 --dry-run
//!   tsdata load --file data/synthetic.json --dataset synthetic --split 1500

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsdata_harness::{
    config::{HarnessConfig, SynthesisSettings},
    ingest::{ingest_generated, load_training_data, unique_dataset_name, PollOutcome},
    search::{InMemoryBackend, OpenSearchClient, Schema, SearchBackend},
    synthetic::{write_generation, GenerationResult, MissingMode, SampleSeed, SampleSupply, Synthesizer},
};

#[derive(Parser, Debug)]
#[command(name = "tsdata")]
#[command(about = "Generate synthetic multi-entity time series and load them into a search endpoint")]
struct Cli {
    /// Harness config file (defaults to $TSDATA_CONFIG_PATH or tsdata.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct GenerateArgs {
    /// Minutes between consecutive timestamps
    #[arg(long)]
    interval: Option<u32>,

    /// Records dated before "now"
    #[arg(long)]
    split: Option<usize>,

    #[arg(long)]
    entities: Option<usize>,

    /// Field holding the entity label
    #[arg(long)]
    field: Option<String>,

    /// Missing-data mode (e.g. missing-timestamp, NO_MISSING_DATA)
    #[arg(long)]
    mode: Option<MissingMode>,

    /// First and last dropped interval for continuous-impute
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    impute_window: Option<Vec<u64>>,

    /// Number of uniform values to draw
    #[arg(long)]
    samples: Option<usize>,

    /// Draw values from an unseeded stream
    #[arg(long)]
    unseeded: bool,

    /// Seed for drop decisions
    #[arg(long)]
    drop_seed: Option<u64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SchemaKind {
    Synthetic,
    Rule,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize a dataset and write it as JSON
    Generate {
        #[command(flatten)]
        args: GenerateArgs,

        /// Output file (stdout summary only if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Synthesize, bulk-ingest and wait for visibility
    Ingest {
        #[command(flatten)]
        args: GenerateArgs,

        /// Collection name (random when omitted)
        #[arg(short, long)]
        dataset: Option<String>,

        /// Ingest only the first N records (0 = all)
        #[arg(long, default_value = "0")]
        ingest_size: usize,

        /// Use an in-memory backend instead of the endpoint
        #[arg(long)]
        dry_run: bool,

        /// Fail when ingestion is not confirmed in time
        #[arg(long)]
        strict: bool,
    },

    /// Ingest the training split of a JSON-array dataset file
    Load {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        dataset: String,

        #[arg(long, value_enum, default_value = "synthetic")]
        schema: SchemaKind,

        /// Number of leading documents to ingest
        #[arg(long)]
        split: usize,

        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsdata_harness=info,tsdata=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<HarnessConfig> {
    match path {
        Some(path) => {
            let mut config = HarnessConfig::load(path)
                .with_context(|| format!("failed to load config {:?}", path))?;
            config.endpoint.apply_env();
            Ok(config)
        }
        None => Ok(HarnessConfig::from_env()),
    }
}

/// Command-line flags override the `[synthesis]` section.
fn merge_settings(mut settings: SynthesisSettings, args: &GenerateArgs) -> SynthesisSettings {
    if let Some(v) = args.interval {
        settings.interval_minutes = v;
    }
    if let Some(v) = args.split {
        settings.train_test_split = v;
    }
    if let Some(v) = args.entities {
        settings.entities = v;
    }
    if let Some(v) = &args.field {
        settings.categorical_field = v.clone();
    }
    if let Some(v) = args.mode {
        settings.mode = v;
    }
    if let Some([start, end]) = args.impute_window.as_deref() {
        settings.impute_start = *start;
        settings.impute_end = *end;
    }
    if let Some(v) = args.samples {
        settings.sample_count = v;
    }
    if args.drop_seed.is_some() {
        settings.drop_seed = args.drop_seed;
    }
    settings
}

fn generate(settings: &SynthesisSettings, seeded: bool) -> Result<GenerationResult> {
    let synthesizer =
        Synthesizer::new(settings.to_params()).with_drop_seed(SampleSeed::from(settings.drop_seed));
    let result = synthesizer
        .run(SampleSupply::Uniform {
            count: settings.sample_count,
            seeded,
        })
        .context("generation failed")?;

    let summary = result.summary();
    info!(
        "generated {} records ({} train, {} test), {} missing timestamps, {} missing entities",
        summary.records,
        summary.train_records,
        summary.test_records,
        summary.missing_timestamps,
        summary.missing_entities
    );
    Ok(result)
}

fn report_outcome(dataset: &str, outcome: PollOutcome, strict: bool) -> Result<()> {
    match outcome {
        PollOutcome::Ready {
            observed_id,
            cycles,
        } => {
            info!("{} ready: latest id {:?} after {} cycles", dataset, observed_id, cycles);
            Ok(())
        }
        PollOutcome::TimedOut {
            last_observed,
            cycles,
        } => {
            warn!(
                "{} not confirmed after {} cycles (latest id {:?})",
                dataset, cycles, last_observed
            );
            if strict {
                bail!("ingestion into {} was not confirmed", dataset);
            }
            Ok(())
        }
    }
}

fn backend(config: &HarnessConfig, dry_run: bool) -> Result<Box<dyn SearchBackend>> {
    if dry_run {
        info!("dry run: using in-memory backend");
        return Ok(Box::new(InMemoryBackend::new()));
    }
    let client =
        OpenSearchClient::new(&config.endpoint).context("failed to build search client")?;
    info!("using endpoint {}", client.base_url());
    Ok(Box::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let ingest_config = config.ingest.to_ingest_config();
    let poll_config = config.poll.to_poll_config();

    match cli.command {
        Commands::Generate { args, output } => {
            let settings = merge_settings(config.synthesis.clone(), &args);
            let result = generate(&settings, !args.unseeded)?;
            match output {
                Some(path) => {
                    write_generation(&path, &result)
                        .with_context(|| format!("failed to write {:?}", path))?;
                    info!("wrote {:?}", path);
                }
                None => println!("{}", serde_json::to_string_pretty(&result.summary())?),
            }
        }

        Commands::Ingest {
            args,
            dataset,
            ingest_size,
            dry_run,
            strict,
        } => {
            let settings = merge_settings(config.synthesis.clone(), &args);
            let result = generate(&settings, !args.unseeded)?;
            let dataset = dataset.unwrap_or_else(|| unique_dataset_name("synthetic"));
            let backend = backend(&config, dry_run)?;

            let outcome = ingest_generated(
                backend.as_ref(),
                &result,
                &dataset,
                Some(ingest_size),
                &ingest_config,
                &poll_config,
            )
            .await
            .with_context(|| format!("ingestion into {} failed", dataset))?;
            report_outcome(&dataset, outcome, strict)?;
        }

        Commands::Load {
            file,
            dataset,
            schema,
            split,
            dry_run,
        } => {
            let schema = match schema {
                SchemaKind::Synthetic => Schema::synthetic(),
                SchemaKind::Rule => Schema::rule(),
            };
            let backend = backend(&config, dry_run)?;
            let load = load_training_data(
                backend.as_ref(),
                &file,
                &dataset,
                &schema,
                split,
                &ingest_config,
                &poll_config,
            )
            .await
            .with_context(|| format!("failed to load {:?} into {}", file, dataset))?;
            println!("{}", load.train_end.to_rfc3339());
            report_outcome(&dataset, load.outcome, false)?;
        }
    }

    Ok(())
}
