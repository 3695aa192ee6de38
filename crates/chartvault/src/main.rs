use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cas::FileBlobStore;
use chartconf::VaultConfig;
use chartfmt::{convert, detect, ConvertOptions};
use chartvault::{
    telemetry, ChartId, ChartMetadata, EditFlags, EditRequest, Ingest, MetadataPatch, OwnerId,
    SqliteMetadataStore, Upload, UploadRequest,
};
use clap::{Args, Parser, Subcommand};

/// Chart asset vault
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file replacing ./chartvault.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a new chart
    Upload(UploadArgs),
    /// Edit a chart's metadata or files
    Edit(EditArgs),
    /// Print a stored chart as JSON
    Show {
        chart: String,
    },
    /// Print the detected format of a script
    Detect {
        script: PathBuf,
    },
    /// Convert a script into the canonical container
    Convert {
        script: PathBuf,
        /// Where to write the container (defaults to <script>.gz)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[arg(long)]
    owner: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    author: String,
    #[arg(long)]
    artists: String,
    #[arg(long)]
    rating: i32,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    script: PathBuf,
    #[arg(long)]
    audio: PathBuf,
    #[arg(long)]
    jacket: PathBuf,
    #[arg(long)]
    preview: Option<PathBuf>,
    #[arg(long)]
    background: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EditArgs {
    #[arg(long)]
    owner: String,
    chart: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    artists: Option<String>,
    #[arg(long)]
    rating: Option<i32>,
    /// Replaces all tags; pass once per tag
    #[arg(long = "tag")]
    tags: Option<Vec<String>>,
    /// An empty string clears the description
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    script: Option<PathBuf>,
    #[arg(long)]
    audio: Option<PathBuf>,
    #[arg(long)]
    jacket: Option<PathBuf>,
    #[arg(long)]
    preview: Option<PathBuf>,
    #[arg(long)]
    background: Option<PathBuf>,
    #[arg(long, conflicts_with = "preview")]
    delete_preview: bool,
    #[arg(long, conflicts_with = "background")]
    delete_background: bool,
}

async fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut upload = Upload::new(bytes);
    if let Some(name) = path.file_name() {
        upload = upload.with_filename(name.to_string_lossy());
    }
    Ok(upload)
}

async fn read_optional(path: Option<&PathBuf>) -> Result<Option<Upload>> {
    match path {
        Some(path) => Ok(Some(read_upload(path).await?)),
        None => Ok(None),
    }
}

async fn open_ingest(config: &VaultConfig) -> Result<Ingest> {
    tokio::fs::create_dir_all(&config.paths.blob_dir)
        .await
        .context("Failed to create blob directory")?;
    if let Some(parent) = config.paths.db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create database directory")?;
    }

    let blobs = FileBlobStore::at_path(&config.paths.blob_dir)
        .await
        .context("Failed to open blob store")?;
    let metadata =
        SqliteMetadataStore::open(&config.paths.db_path).context("Failed to open chart database")?;
    tracing::debug!(
        blob_dir = %config.paths.blob_dir.display(),
        db = %config.paths.db_path.display(),
        "stores ready"
    );

    Ok(Ingest::new(Arc::new(blobs), Arc::new(metadata), config))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn upload(ingest: &Ingest, args: UploadArgs) -> Result<()> {
    let owner = OwnerId::new(args.owner)?;
    let request = UploadRequest {
        metadata: ChartMetadata {
            title: args.title,
            author: args.author,
            artists: args.artists,
            rating: args.rating,
            tags: args.tags,
            description: args.description,
        },
        script: read_upload(&args.script).await?,
        audio: read_upload(&args.audio).await?,
        jacket: read_upload(&args.jacket).await?,
        preview: read_optional(args.preview.as_ref()).await?,
        background: read_optional(args.background.as_ref()).await?,
    };

    let id = ingest.upload(&owner, request).await?;
    print_json(&serde_json::json!({ "id": id }))
}

async fn edit(ingest: &Ingest, args: EditArgs) -> Result<()> {
    let owner = OwnerId::new(args.owner)?;
    let chart = ChartId::parse(&args.chart)?;

    let flags = EditFlags {
        includes_script: args.script.is_some(),
        includes_audio: args.audio.is_some(),
        includes_jacket: args.jacket.is_some(),
        includes_preview: args.preview.is_some(),
        includes_background: args.background.is_some(),
        delete_preview: args.delete_preview,
        delete_background: args.delete_background,
    };
    let request = EditRequest {
        metadata: MetadataPatch {
            title: args.title,
            author: args.author,
            artists: args.artists,
            rating: args.rating,
            tags: args.tags,
            description: args.description,
        },
        flags,
        script: read_optional(args.script.as_ref()).await?,
        audio: read_optional(args.audio.as_ref()).await?,
        jacket: read_optional(args.jacket.as_ref()).await?,
        preview: read_optional(args.preview.as_ref()).await?,
        background: read_optional(args.background.as_ref()).await?,
    };

    let outcome = ingest.edit(&owner, &chart, request).await?;
    print_json(&outcome)
}

async fn convert_file(config: &VaultConfig, script: &Path, output: Option<PathBuf>) -> Result<()> {
    let bytes = tokio::fs::read(script)
        .await
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let format = detect(&bytes);
    if !format.is_recognized() {
        anyhow::bail!("{}: unrecognized script format", script.display());
    }
    let options = if config.ingest.debug {
        ConvertOptions::debug()
    } else {
        ConvertOptions::default()
    };
    let container = convert(format, &bytes, &options)?;
    let hash = cas::ContentHash::from_data(&container);

    let output = output.unwrap_or_else(|| script.with_extension("gz"));
    tokio::fs::write(&output, &container)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    print_json(&serde_json::json!({
        "format": format.to_string(),
        "hash": hash.to_string(),
        "size": container.len(),
        "output": output.display().to_string(),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = VaultConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    telemetry::init(&config.telemetry).context("Failed to initialize telemetry")?;
    for file in &sources.files {
        tracing::debug!(path = %file.display(), "config file loaded");
    }

    let result = match cli.command {
        Command::Upload(args) => {
            let ingest = open_ingest(&config).await?;
            upload(&ingest, args).await
        }
        Command::Edit(args) => {
            let ingest = open_ingest(&config).await?;
            edit(&ingest, args).await
        }
        Command::Show { chart } => {
            let ingest = open_ingest(&config).await?;
            let chart = ChartId::parse(&chart)?;
            let record = ingest.show(&chart).await?;
            print_json(&record)
        }
        Command::Detect { script } => {
            let bytes = tokio::fs::read(&script)
                .await
                .with_context(|| format!("Failed to read {}", script.display()))?;
            println!("{}", detect(&bytes));
            Ok(())
        }
        Command::Convert { script, output } => convert_file(&config, &script, output).await,
        Command::Config => {
            print!("{}", config.to_toml());
            for file in &sources.files {
                println!("# loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
            Ok(())
        }
    };

    telemetry::shutdown();
    result
}
