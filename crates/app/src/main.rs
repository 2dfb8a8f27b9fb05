use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_retrieval_core::{
    build_embedder, cited_source_names, load_config, Embedder, EmbeddingProvider, EngineConfig,
    OpenAiEmbedder, RetrievalEngine, SearchQuery, SourceDocument,
};

#[derive(Parser)]
#[command(name = "workspace-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML config file; built-in defaults apply when omitted.
    #[arg(long, env = "RETRIEVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the persisted vector store.
    #[arg(long, env = "RETRIEVAL_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Embedding backend.
    #[arg(long, value_enum)]
    embedder: Option<EmbedderKind>,

    /// Base URL of an OpenAI-compatible embeddings API.
    #[arg(long, env = "LLM_BASE_URL")]
    base_url: Option<String>,

    /// Embedding model name.
    #[arg(long, env = "EMBEDDING_MODEL")]
    model: Option<String>,

    /// API key; falls back to the variable named by `embedding.api_key_env`.
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Openai,
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store one source's text.
    Ingest {
        /// Numeric id of the source.
        #[arg(long)]
        source_id: i64,
        /// Display name used when citing the source.
        #[arg(long)]
        name: String,
        /// Workspace that owns the source.
        #[arg(long)]
        workspace: String,
        /// Plain-text file to ingest; reads stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Remove every chunk of a source.
    Remove {
        #[arg(long)]
        source_id: i64,
        /// Limit removal to one workspace.
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Return the passages that best ground a question.
    Query {
        #[arg(long)]
        query: String,
        #[arg(long)]
        workspace: Option<String>,
        /// Number of passages to return.
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict to these source ids (repeatable).
        #[arg(long = "source")]
        sources: Vec<i64>,
        /// Minimum cosine similarity.
        #[arg(long)]
        min_similarity: Option<f64>,
        /// Print hits as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List stored sources and their chunk counts.
    Sources {
        #[arg(long)]
        workspace: Option<String>,
    },
}

fn resolve_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(dir) = &cli.store_dir {
        config.store.dir = dir.clone();
    }
    if let Some(kind) = cli.embedder {
        config.embedding.provider = match kind {
            EmbedderKind::Openai => EmbeddingProvider::OpenAi,
            EmbedderKind::Ngram => EmbeddingProvider::Ngram,
        };
    }
    if let Some(base_url) = &cli.base_url {
        config.embedding.base_url = base_url.clone();
    }
    if let Some(model) = &cli.model {
        config.embedding.model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

fn embedder_for(cli: &Cli, config: &EngineConfig) -> anyhow::Result<Box<dyn Embedder>> {
    match (&cli.api_key, config.embedding.provider) {
        (Some(key), EmbeddingProvider::OpenAi) => {
            Ok(Box::new(OpenAiEmbedder::with_api_key(&config.embedding, key)?))
        }
        _ => Ok(build_embedder(&config.embedding)?),
    }
}

async fn read_source_text(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let embedder = embedder_for(&cli, &config)?;
    let engine = RetrievalEngine::from_config(&config, embedder);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = %config.store.path().display(),
        model = engine.embedder().model_name(),
        "workspace-retrieval boot"
    );

    match cli.command {
        Command::Ingest {
            source_id,
            name,
            workspace,
            file,
        } => {
            let text = read_source_text(file.as_ref()).await?;
            let document = SourceDocument {
                source_id,
                source_name: name,
                workspace_id: workspace,
                text,
            };

            let report = engine.ingest_source(&document).await?;
            if report.chunk_count == 0 {
                warn!(source_id, "source had no text to index");
            }
            println!(
                "{} chunks ingested for source {} in workspace {} ({} replaced) at {}",
                report.chunk_count,
                report.source_id,
                report.workspace_id,
                report.replaced,
                report.ingested_at.to_rfc3339()
            );
        }
        Command::Remove {
            source_id,
            workspace,
        } => {
            let removed = match workspace.as_deref() {
                Some(workspace) => engine.remove_workspace_source(workspace, source_id).await?,
                None => engine.remove_source(source_id).await?,
            };
            println!("{removed} chunks removed for source {source_id}");
        }
        Command::Query {
            query,
            workspace,
            limit,
            sources,
            min_similarity,
            json,
        } => {
            let mut search = SearchQuery::new(query)
                .with_limit(limit.unwrap_or(config.retrieval.limit))
                .with_min_similarity(min_similarity.unwrap_or(config.retrieval.min_similarity));
            if let Some(workspace) = workspace {
                search = search.in_workspace(workspace);
            }
            if !sources.is_empty() {
                search = search.restricted_to(sources);
            }

            let hits = engine.query(&search).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
                return Ok(());
            }

            println!("query: {}", search.text);
            for hit in &hits {
                println!(
                    "[{}] similarity={:.4} distance={:.4} source={} ({})",
                    hit.id,
                    hit.similarity,
                    hit.distance,
                    hit.metadata.source_name,
                    hit.metadata.source_id
                );
                println!("  chunk_text:\n{}", hit.text);
            }
            let cited = cited_source_names(&hits);
            if !cited.is_empty() {
                println!("cited: {}", cited.join(", "));
            }
        }
        Command::Sources { workspace } => {
            for summary in engine.sources(workspace.as_deref()).await? {
                println!(
                    "{}\t{}\t{}\t{} chunks",
                    summary.workspace_id, summary.source_id, summary.source_name, summary.chunk_count
                );
            }
        }
    }

    Ok(())
}
