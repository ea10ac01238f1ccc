use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use tabfuse_pipeline::{
    io, Driver, PartitionPolicy, PipelineConfig, PipelineInputs, TestIndices,
};
use tabfuse_trees::HyperparameterTable;

#[derive(Parser)]
#[command(
    name = "tabfuse",
    about = "Per-feature boosted trees fused by a convolutional ensembler"
)]
struct Cli {
    /// JSON configuration, defaults are used for missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Training table with header ID_code,target,<features>
    #[arg(long)]
    train: PathBuf,

    /// Test table with header ID_code,<features>
    #[arg(long)]
    test: PathBuf,

    /// Rows of the test table holding synthetic samples
    #[arg(long)]
    fake_indices: Option<PathBuf>,

    /// Rows of the test table scored on the public leaderboard
    #[arg(long)]
    public_indices: Option<PathBuf>,

    /// Rows of the test table scored on the private leaderboard
    #[arg(long)]
    private_indices: Option<PathBuf>,

    /// Per-feature booster parameters, the compiled-in table if omitted
    #[arg(long)]
    hyperparams: Option<PathBuf>,

    /// Where the submission is written
    #[arg(long, default_value = "submission.csv")]
    output: PathBuf,

    /// Hold out part of the training table instead of scoring the test table
    #[arg(long)]
    experimental: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if cli.experimental && !config.partition.is_experimental() {
        config.partition = PartitionPolicy::experimental();
    }

    let table = match &cli.hyperparams {
        Some(path) => HyperparameterTable::from_path(path)
            .with_context(|| format!("reading hyperparameters {}", path.display()))?,
        None => HyperparameterTable::shipped()?,
    };

    let train = io::read_table_path(&cli.train, true)
        .with_context(|| format!("reading {}", cli.train.display()))?;
    let test = io::read_table_path(&cli.test, false)
        .with_context(|| format!("reading {}", cli.test.display()))?;

    let indices = if config.partition.is_experimental() {
        None
    } else {
        let (fake, public, private) = match (
            &cli.fake_indices,
            &cli.public_indices,
            &cli.private_indices,
        ) {
            (Some(fake), Some(public), Some(private)) => (fake, public, private),
            _ => bail!("production mode needs --fake-indices, --public-indices and --private-indices"),
        };
        Some(TestIndices {
            fake: io::read_indices_path(fake)
                .with_context(|| format!("reading {}", fake.display()))?,
            public: io::read_indices_path(public)
                .with_context(|| format!("reading {}", public.display()))?,
            private: io::read_indices_path(private)
                .with_context(|| format!("reading {}", private.display()))?,
        })
    };

    let output = Driver::new(config, table).run(PipelineInputs {
        train,
        test,
        indices,
    })?;

    if let Some(submission) = &output.submission {
        io::write_submission_path(&cli.output, &submission.ids, &submission.targets)?;
    }
    if let Some(auc) = output.test_auc {
        info!(test_auc = auc, "experimental run finished");
    }
    Ok(())
}
