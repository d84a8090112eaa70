use std::io::BufRead;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use embedrock_core::images::ImageLoader;
use embedrock_core::{EmbeddingFunction, EmbeddingRegistry, ImageSource, NoopEmbedding, Query, SourceInput};

#[derive(Parser)]
#[command(name = "embedrock", about = "Compute text and image embeddings with Amazon Bedrock")]
struct Cli {
    /// Registered embedding function to use
    #[arg(long, default_value = "bedrock-titan-embed-multilingual", env = "EMBEDROCK_MODEL")]
    model: String,

    /// AWS region of the Bedrock endpoint
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Named AWS profile for the base session
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Role ARN to assume before calling Bedrock
    #[arg(long, env = "EMBEDROCK_ASSUMED_ROLE")]
    assumed_role: Option<String>,

    /// Session name used when assuming the role
    #[arg(long, env = "EMBEDROCK_ROLE_SESSION_NAME")]
    role_session_name: Option<String>,

    /// Override the AWS endpoint URL
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Images per chunk
    #[arg(long, env = "EMBEDROCK_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Maximum concurrent Bedrock calls within a chunk
    #[arg(long, env = "EMBEDROCK_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Fail when a response has no embedding instead of emitting an empty vector
    #[arg(long)]
    strict: bool,

    /// Emit zero vectors without calling Bedrock
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a single search query
    Query {
        /// Query text
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,

        /// Query image (path, file:// or http(s):// URI)
        #[arg(long)]
        image: Option<String>,
    },
    /// Embed a list of images; pass `-` to read URIs from stdin, one per line
    Source {
        #[arg(required = true)]
        uris: Vec<String>,
    },
    /// List registered embedding functions
    Models,
}

impl Cli {
    fn overrides(&self) -> serde_json::Value {
        let mut fields = serde_json::Map::new();
        if let Some(ref region) = self.region {
            fields.insert("region".into(), region.clone().into());
        }
        if let Some(ref profile) = self.profile {
            fields.insert("profile_name".into(), profile.clone().into());
        }
        if let Some(ref role) = self.assumed_role {
            fields.insert("assumed_role".into(), role.clone().into());
        }
        if let Some(ref session) = self.role_session_name {
            fields.insert("role_session_name".into(), session.clone().into());
        }
        if let Some(ref endpoint) = self.endpoint_url {
            fields.insert("endpoint_url".into(), endpoint.clone().into());
        }
        if let Some(batch_size) = self.batch_size {
            fields.insert("batch_size".into(), batch_size.into());
        }
        if let Some(max_concurrency) = self.max_concurrency {
            fields.insert("max_concurrency".into(), max_concurrency.into());
        }
        if self.strict {
            fields.insert("strict_responses".into(), true.into());
        }
        serde_json::Value::Object(fields)
    }
}

fn read_uris(args: Vec<String>) -> std::io::Result<Vec<ImageSource>> {
    let mut uris = Vec::with_capacity(args.len());
    for arg in args {
        if arg == "-" {
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    uris.push(ImageSource::Uri(trimmed.to_string()));
                }
            }
        } else {
            uris.push(ImageSource::Uri(arg));
        }
    }
    Ok(uris)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("embedrock=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = EmbeddingRegistry::default();

    if let Command::Models = cli.command {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let overrides = cli.overrides();
    let function: Arc<dyn EmbeddingFunction> = if cli.dry_run {
        let config = registry.config_for(&cli.model, &overrides)?;
        tracing::warn!("Dry run: emitting zero vectors, Bedrock is not called");
        Arc::new(NoopEmbedding::new(config.dimensions))
    } else {
        tracing::info!("Using {} embeddings", cli.model);
        registry.create(&cli.model, &overrides)?
    };

    let embeddings = match cli.command {
        Command::Query { text: Some(text), .. } => {
            function.compute_query_embeddings(Query::Text(text)).await?
        }
        Command::Query { image: Some(uri), .. } => {
            let image = ImageLoader::new().to_image(ImageSource::Uri(uri)).await?;
            function.compute_query_embeddings(Query::Image(image)).await?
        }
        Command::Query { .. } => return Err("either --text or --image is required".into()),
        Command::Source { uris } => {
            let sources = read_uris(uris)?;
            tracing::info!("Embedding {} image(s)", sources.len());

            let pb = ProgressBar::new(sources.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")?
                    .progress_chars("=>-"),
            );
            pb.set_message("Embedding images");

            let embeddings = function
                .compute_source_embeddings_with_progress(SourceInput::List(sources), &|done: usize| {
                    pb.set_position(done as u64)
                })
                .await;
            pb.finish_and_clear();
            embeddings?
        }
        Command::Models => return Ok(()),
    };

    let output = serde_json::json!({
        "model": cli.model,
        "dimensions": function.ndims(),
        "embeddings": embeddings,
    });
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
