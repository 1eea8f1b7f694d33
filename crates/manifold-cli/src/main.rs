use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use manifold::{locate, scan, set_field, ScanReport, WorkingTreeWriter};
use manifold_source::helm::DEFAULT_RELEASE_NAME;
use manifold_source::{HelmOptions, SourceOptions};

#[derive(Parser)]
#[command(name = "manifold")]
#[command(about = "Resolve Kubernetes, Helm and Kustomize sources back to the lines that produced them", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Directory to scan
    #[arg(short, long)]
    path: PathBuf,

    /// Values file merged over a chart's values.yaml
    #[arg(long, env = "MANIFOLD_HELM_VALUES_FILE")]
    helm_values_file: Option<PathBuf>,

    /// Release name used when rendering charts
    #[arg(long, env = "MANIFOLD_RELEASE_NAME", default_value = DEFAULT_RELEASE_NAME)]
    release_name: String,
}

impl SourceArgs {
    fn options(&self) -> SourceOptions {
        SourceOptions {
            helm: HelmOptions {
                values_file: self.helm_values_file.clone(),
                release_name: self.release_name.clone(),
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List resolved files and resources
    Scan {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Print the lines of a field as file:start-end
    Locate {
        #[command(flatten)]
        source: SourceArgs,

        /// Resource identity, apiVersion/kind/namespace/name
        #[arg(long)]
        id: String,

        /// Key path, e.g. spec.template.spec.containers[0].image
        #[arg(short, long)]
        key: String,
    },

    /// Set a field in the raw document and write the file
    Set {
        #[command(flatten)]
        source: SourceArgs,

        /// Resource identity, apiVersion/kind/namespace/name
        #[arg(long)]
        id: String,

        /// Key path of the field to set
        #[arg(short, long)]
        key: String,

        /// New value as JSON, e.g. 2 or "\"nginx:1.27\""
        #[arg(long)]
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.debug {
        tracing::Level::TRACE
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.debug) // Show target module in debug mode
        .init();

    match cli.command {
        Commands::Scan { source, format } => handle_scan(&source, format),
        Commands::Locate { source, id, key } => handle_locate(&source, &id, &key),
        Commands::Set {
            source,
            id,
            key,
            value,
        } => handle_set(&source, &id, &key, &value),
    }
}

fn handle_scan(source: &SourceArgs, format: Format) -> Result<()> {
    let files = scan(&source.path, &source.options())?;
    let report = ScanReport::from_files(&files);
    match format {
        Format::Text => print!("{}", report),
        Format::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

fn handle_locate(source: &SourceArgs, id: &str, key: &str) -> Result<()> {
    let files = scan(&source.path, &source.options())?;
    let location = locate(&files, id, key)
        .with_context(|| format!("Resource {} not found under {}", id, source.path.display()))?;
    println!("{}", location);
    Ok(())
}

fn handle_set(source: &SourceArgs, id: &str, key: &str, value: &str) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(value).with_context(|| format!("Invalid JSON value: {}", value))?;

    let mut files = scan(&source.path, &source.options())?;
    let changed = set_field(&mut files, id, key, &value)?;
    WorkingTreeWriter::new().write(std::slice::from_ref(&changed))?;
    info!("Updated {} in {}", key, changed.path.display());
    Ok(())
}
