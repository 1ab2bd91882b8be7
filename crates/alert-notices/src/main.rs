mod batch;
mod cache;
mod config;
mod error;
mod extract;
mod fetch;
mod model;
mod parser;
mod schema;
mod sink;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use notice_common::openai::OpenAiClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

use batch::BatchRunner;
use cache::PageCache;
use config::Config;
use extract::Extractor;
use fetch::Fetcher;
use model::NoticeId;
use schema::{ExtractionSchema, DEFAULT_SCHEMA_PATH};

#[derive(Parser)]
#[command(
    name = "alert-notices",
    about = "Extract observing campaign details from AAVSO Alert Notices"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and extract notices START..END (END exclusive) into OUTPUT.
    /// An existing OUTPUT is resumed: only failed or missing notices are redone.
    Extract {
        start: NoticeId,
        end: NoticeId,
        output: PathBuf,
        /// Extraction schema (function definition JSON)
        #[arg(long, default_value = DEFAULT_SCHEMA_PATH)]
        schema: PathBuf,
        /// Page cache directory (overrides NOTICE_PAGES_DIR)
        #[arg(long)]
        pages_dir: Option<PathBuf>,
        /// Max notices in flight (default: all at once)
        #[arg(short = 'c', long, conflicts_with = "sequential")]
        concurrency: Option<usize>,
        /// Process one notice at a time
        #[arg(long)]
        sequential: bool,
    },
    /// Flatten a JSON result file into a pipe-delimited CSV
    Csv { input: PathBuf, output: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract {
            start,
            end,
            output,
            schema,
            pages_dir,
            concurrency,
            sequential,
        } => {
            if start > end {
                anyhow::bail!("start ({start}) must not be greater than end ({end})");
            }

            let mut config = Config::from_env()?;
            if let Some(dir) = pages_dir {
                config.pages_dir = dir;
            }
            info!(
                model = %config.model,
                base_url = %config.openai.base_url,
                pages_dir = %config.pages_dir.display(),
                max_attempts = config.retry.max_attempts,
                "configuration loaded"
            );

            let schema = ExtractionSchema::load(&schema).await?;
            info!(
                function = schema.name(),
                fields = schema.field_names().len(),
                "extraction schema loaded"
            );
            let cache = PageCache::new(config.pages_dir.clone(), Fetcher::new(config.fetch.clone())?);
            let extractor = Extractor::new(
                OpenAiClient::new(config.openai.clone())?,
                config.model.clone(),
                config.retry,
            );
            let concurrency = if sequential { Some(1) } else { concurrency };
            let runner =
                BatchRunner::new(cache, extractor, schema, output).with_concurrency(concurrency);

            let existing = sink::load_store(runner.output()).await?;
            if let Some(store) = &existing {
                info!(
                    records = store.len(),
                    errors = store.error_count(),
                    "resuming from existing result file"
                );
            }

            let store = runner.run(start..end, existing).await?;
            info!(
                records = store.len(),
                errors = store.error_count(),
                output = %runner.output().display(),
                "data extraction complete"
            );
        }
        Commands::Csv { input, output } => {
            let rows = sink::project_to_csv(&input, &output).await?;
            info!(rows, csv = %output.display(), "csv written");
        }
    }
    Ok(())
}
