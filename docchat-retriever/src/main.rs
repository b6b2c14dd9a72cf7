use anyhow::Result;
use clap::{Parser, Subcommand};
use docchat_chunk::ChunkConfig;
use docchat_embed::{EmbedConfig, FastEmbedProvider};
use docchat_retriever::llm::{ChatCompletionsClient, DEFAULT_COMPLETION_MODEL};
use docchat_retriever::retrieval::chunk_index::ChunkIndex;
use docchat_retriever::retrieval::engine::DocChatEngine;
use docchat_retriever::retrieval::search::SearchConfig;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Chat with your documents: ingest PDFs and query them semantically.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the chunk database file
    #[arg(short, long, default_value = ".docchat.db")]
    database: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the chunk database
    Init,
    /// Ingest one or more PDF files
    Ingest {
        /// PDF files to ingest
        files: Vec<PathBuf>,
        /// Maximum chunk size in characters
        #[arg(long, default_value_t = 250)]
        chunk_size: usize,
        /// Characters of overlap carried across chunk boundaries
        #[arg(long, default_value_t = 25)]
        overlap: usize,
        /// Embedding model identifier
        #[arg(long, default_value = docchat_embed::DEFAULT_MODEL_NAME)]
        model: String,
    },
    /// Ask a question against the ingested corpus
    Ask {
        /// The question to answer
        query: String,
        /// Number of passages to retrieve
        #[arg(short = 'k', long, default_value_t = 1)]
        top_k: usize,
        /// Minimum cosine similarity for a passage to count as a match
        #[arg(long, default_value_t = 0.25)]
        threshold: f32,
        /// Embedding model identifier (must match the one used at ingestion)
        #[arg(long, default_value = docchat_embed::DEFAULT_MODEL_NAME)]
        model: String,
        /// Skip answer generation even if OPENAI_API_KEY is set
        #[arg(long)]
        no_generate: bool,
    },
    /// Print a stored chunk by id
    Get {
        /// Chunk ID
        id: i64,
    },
    /// Show store statistics
    Stats,
    /// Delete all chunks and embeddings
    Clear,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match args.command {
        Commands::Init => {
            let _index = ChunkIndex::open(&args.database).await?;
            println!("Initialized chunk database at {}", args.database.display());
            Ok(())
        }
        Commands::Ingest {
            files,
            chunk_size,
            overlap,
            model,
        } => {
            anyhow::ensure!(!files.is_empty(), "no files given");
            let chunk_config = ChunkConfig::new(chunk_size, overlap)?;

            let index = ChunkIndex::open(&args.database).await?;
            let provider = Arc::new(FastEmbedProvider::create(EmbedConfig::new(model)).await?);
            let engine = DocChatEngine::new(
                index,
                chunk_config,
                SearchConfig::default(),
                provider,
            );

            let mut documents = Vec::with_capacity(files.len());
            for path in &files {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                let bytes = tokio::fs::read(path).await?;
                documents.push((name, bytes));
            }

            let report = engine.ingest_documents(&documents).await?;
            println!(
                "{} ({} chunks, {} embeddings)",
                report.summary(),
                report.chunks_stored,
                report.embeddings_created
            );
            for failure in &report.failures {
                println!("  failed: {} ({})", failure.document, failure.reason);
            }
            Ok(())
        }
        Commands::Ask {
            query,
            top_k,
            threshold,
            model,
            no_generate,
        } => {
            let index = ChunkIndex::open(&args.database).await?;
            let provider = Arc::new(FastEmbedProvider::create(EmbedConfig::new(model)).await?);
            let mut engine = DocChatEngine::new(
                index,
                ChunkConfig::default(),
                SearchConfig::new(threshold, top_k),
                provider,
            );

            if !no_generate {
                if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
                    let client = ChatCompletionsClient::new(api_key, DEFAULT_COMPLETION_MODEL)?;
                    engine = engine.with_completions(Arc::new(client));
                }
            }

            let answer = engine.ask(&query).await?;
            if answer.passages.is_empty() {
                println!("No relevant passage found.");
                return Ok(());
            }

            for passage in &answer.passages {
                let source = passage
                    .chunk
                    .references
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "[chunk {} | {:.3} | {}]\n{}\n",
                    passage.chunk.id, passage.similarity, source, passage.chunk.text
                );
            }

            match answer.response {
                Some(response) => println!("Answer: {response}"),
                None if no_generate => {}
                None => println!("No response available."),
            }
            Ok(())
        }
        Commands::Get { id } => {
            let index = ChunkIndex::open(&args.database).await?;
            match index.get_chunk(id).await? {
                Some(chunk) => {
                    let source = chunk
                        .references
                        .iter()
                        .map(|r| r.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("[chunk {} | {}]\n{}", chunk.id, source, chunk.text);
                }
                None => println!("Chunk {id} not found"),
            }
            Ok(())
        }
        Commands::Stats => {
            let index = ChunkIndex::open(&args.database).await?;
            let stats = index.stats().await?;
            println!("documents:  {}", stats.documents);
            println!("chunks:     {}", stats.chunks);
            println!("embeddings: {}", stats.embeddings);
            Ok(())
        }
        Commands::Clear => {
            let index = ChunkIndex::open(&args.database).await?;
            index.clear().await?;
            println!("Store cleared.");
            Ok(())
        }
    }
}
