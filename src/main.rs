use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use routewise::{
    ArtifactStore, BundleLoader, ErpSource, FeatureSchema, PredictOptions, PredictionMode,
    Predictor, RecommendConfig, SqliteErpSource, Trainer,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Routing recommendations from similar items and shop-floor history
#[derive(Parser, Debug)]
#[command(name = "routewise")]
#[command(version, about = "Routing recommendations from similar items and shop-floor history", long_about = None)]
struct Args {
    /// JSON configuration file; absent keys take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ERP database (SQLite file exposing the ERP views)
    #[arg(long, default_value = "./erp.sqlite")]
    erp: PathBuf,

    /// Artifact bundle directory
    #[arg(short, long, default_value = "./models")]
    models: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit on the item master and publish a new bundle
    Train {
        /// JSON feature schema; the standard ERP columns when omitted
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Recommend routings for one item
    Predict {
        item_code: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Recommend routings for several items
    PredictBatch {
        item_codes: Vec<String>,
        /// File with one item code per line
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Check every artifact hash of a bundle
    Verify {
        /// Version to check; the latest when omitted
        version: Option<String>,
    },
    /// List published bundle versions
    Versions,
}

#[derive(ClapArgs, Debug)]
struct OptionArgs {
    #[arg(long)]
    top_k: Option<usize>,

    /// detailed or aggregated
    #[arg(long, default_value = "detailed")]
    mode: PredictionMode,

    #[arg(long)]
    threshold: Option<f32>,

    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl OptionArgs {
    fn apply(&self, mut options: PredictOptions) -> PredictOptions {
        if let Some(top_k) = self.top_k {
            options = options.with_top_k(top_k);
        }
        if let Some(threshold) = self.threshold {
            options = options.with_threshold(threshold);
        }
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout(Some(Duration::from_millis(ms)));
        }
        options.with_mode(self.mode)
    }
}

#[derive(Serialize)]
struct VersionList {
    latest: Option<String>,
    versions: Vec<String>,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr; stdout carries the JSON result
    match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        Err(_) => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RecommendConfig> {
    match path {
        Some(path) => RecommendConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(RecommendConfig::default()),
    }
}

fn load_schema(path: Option<&Path>) -> anyhow::Result<FeatureSchema> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading schema {}", path.display()))?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(FeatureSchema::erp_default()),
    }
}

fn open_source(path: &Path, config: &RecommendConfig) -> anyhow::Result<Arc<dyn ErpSource>> {
    let source = SqliteErpSource::open(path, config)
        .with_context(|| format!("opening ERP database {}", path.display()))?;
    Ok(Arc::new(source))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Routewise v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config(args.config.as_deref())?;
    let store = ArtifactStore::new(&args.models)?;

    match args.command {
        Command::Train { schema } => {
            let schema = load_schema(schema.as_deref())?;
            let source = open_source(&args.erp, &config)?;
            let report = Trainer::new(schema, config)?.train(source.as_ref(), &store)?;
            print_json(&report)?;
        }
        Command::Predict { item_code, options } => {
            let source = open_source(&args.erp, &config)?;
            let loader = Arc::new(BundleLoader::open(store)?);
            let predictor = Predictor::new(loader, source, config)?;
            let options = options.apply(predictor.options());
            print_json(&predictor.predict(&item_code, &options)?)?;
        }
        Command::PredictBatch {
            mut item_codes,
            file,
            options,
        } => {
            if let Some(file) = file {
                let raw = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading item list {}", file.display()))?;
                item_codes.extend(
                    raw.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                );
            }
            anyhow::ensure!(!item_codes.is_empty(), "no item codes given");

            let source = open_source(&args.erp, &config)?;
            let loader = Arc::new(BundleLoader::open(store)?);
            let predictor = Predictor::new(loader, source, config)?;
            let options = options.apply(predictor.options());
            print_json(&predictor.predict_batch(&item_codes, &options)?)?;
        }
        Command::Verify { version } => {
            let version = match version {
                Some(v) => v,
                None => store
                    .latest_version()?
                    .context("no bundle has been published")?,
            };
            let manifest = store.verify(&version)?;
            info!(version = %version, "bundle verified");
            print_json(&manifest)?;
        }
        Command::Versions => {
            print_json(&VersionList {
                latest: store.latest_version()?,
                versions: store.list_versions()?,
            })?;
        }
    }

    Ok(())
}
