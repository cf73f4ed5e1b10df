use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use doc_context_core::{
    chunk_spans, discover_documents, extract_declared, ChunkingConfig, DocumentCoordinator,
    IngestionOptions, RetrievalOptions, VectorStrategy,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-context", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Words per chunk window
    #[arg(long, env = "DOC_CONTEXT_WINDOW_WORDS", default_value = "1000", global = true)]
    window_words: usize,

    /// Words shared between consecutive chunks
    #[arg(long, env = "DOC_CONTEXT_OVERLAP_WORDS", default_value = "200", global = true)]
    overlap_words: usize,

    /// Largest accepted document, in bytes
    #[arg(
        long,
        env = "DOC_CONTEXT_MAX_DOCUMENT_BYTES",
        default_value = "10485760",
        global = true
    )]
    max_document_bytes: usize,

    /// Chunk vector representation
    #[arg(
        long,
        env = "DOC_CONTEXT_STRATEGY",
        value_enum,
        default_value_t = Strategy::Tfidf,
        global = true
    )]
    strategy: Strategy,

    /// Vocabulary cap for the tfidf strategy
    #[arg(long, env = "DOC_CONTEXT_MAX_FEATURES", default_value = "5000", global = true)]
    max_features: usize,

    /// Minimum similarity a chunk must exceed to be returned
    #[arg(long, env = "DOC_CONTEXT_MIN_SCORE", default_value = "0.1", global = true)]
    min_score: f32,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Tfidf,
    HashedNgram,
}

impl From<Strategy> for VectorStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::Tfidf => VectorStrategy::Tfidf,
            Strategy::HashedNgram => VectorStrategy::HashedNgram,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Extract one document and print its chunk windows.
    Chunk {
        /// Document to split (.pdf, .docx or .txt).
        #[arg(long)]
        file: PathBuf,
    },
    /// Load documents into one session and print the context for a query.
    Ask {
        /// Documents to upload, in order.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Folder whose supported documents are uploaded recursively.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Question to retrieve context for.
        #[arg(long)]
        query: String,
        /// Session identifier; a random one is generated when omitted.
        #[arg(long)]
        session: Option<String>,
        /// Number of chunks to return.
        #[arg(long, env = "DOC_CONTEXT_TOP_K", default_value = "3")]
        top_k: usize,
        /// Print reports and hits as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Delete the session afterwards and query it again.
        #[arg(long, default_value_t = false)]
        delete_after: bool,
    },
}

impl Cli {
    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            window_words: self.window_words,
            overlap_words: self.overlap_words,
            max_document_bytes: self.max_document_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let ingestion = cli.ingestion_options();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-context boot"
    );

    match cli.command {
        Command::Chunk { ref file } => {
            let config = ChunkingConfig::from(&ingestion);
            let name = file_name(file)?;
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;

            let text = extract_declared(&bytes, &name)?;
            let tokens = text.split_whitespace().collect::<Vec<_>>();
            let spans = chunk_spans(tokens.len(), config)?;

            println!("{name}: {} words, {} chunks", tokens.len(), spans.len());
            for (index, span) in spans.iter().enumerate() {
                println!(
                    "[{index}] words {}..{} ({} words)",
                    span.start,
                    span.end,
                    span.len()
                );
            }
        }
        Command::Ask {
            ref files,
            ref folder,
            ref query,
            ref session,
            top_k,
            json,
            delete_after,
        } => {
            let retrieval = RetrievalOptions {
                top_k,
                min_score: cli.min_score,
            };
            let coordinator = DocumentCoordinator::with_strategy(
                cli.strategy.into(),
                cli.max_features,
                ingestion,
                retrieval,
            )?;
            info!(
                strategy = coordinator.index().strategy(),
                top_k,
                min_score = cli.min_score,
                "retrieval configured"
            );

            let session_id = session
                .clone()
                .unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()));

            let mut paths = files.clone();
            if let Some(folder) = folder {
                paths.extend(discover_documents(folder));
            }
            if paths.is_empty() {
                anyhow::bail!("no documents given; pass --file or --folder");
            }

            let mut reports = Vec::new();
            for path in &paths {
                let name = file_name(path)?;
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                let report = coordinator.upload(bytes, &name, &session_id).await;
                if !report.processed {
                    warn!(
                        path = %path.display(),
                        reason = report.error.as_deref().unwrap_or_default(),
                        "skipped document"
                    );
                }
                reports.push(report);
            }

            let hits = coordinator.search(&session_id, query, Some(top_k)).await;
            let context = doc_context_core::join_context(&hits);

            if json {
                let output = serde_json::json!({
                    "session_id": session_id,
                    "uploads": reports,
                    "stats": coordinator.session_stats(&session_id),
                    "hits": hits,
                    "context": context,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                for report in &reports {
                    match &report.error {
                        None => println!("uploaded {} ({} chunks)", report.filename, report.chunks),
                        Some(error) => println!("failed {}: {error}", report.filename),
                    }
                }
                println!("query: {query}");
                for hit in &hits {
                    println!(
                        "score={:.4} chunk={} ordinal={}",
                        hit.score, hit.chunk_id, hit.ordinal
                    );
                }
                if context.is_empty() {
                    println!("no relevant context");
                } else {
                    println!("context:\n{context}");
                }
            }

            if delete_after {
                let deleted = coordinator.delete_session(&session_id).await;
                let after = coordinator
                    .context_for_query(&session_id, query, Some(top_k))
                    .await;
                println!("deleted={deleted} context_after_delete={after:?}");
            }
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("path has no file name: {}", path.display()))
}
