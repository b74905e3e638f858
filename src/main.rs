use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use search_provider::commands::{EmbeddingSource, add_document, search};
use search_provider::config::{Config, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "search-provider")]
#[command(about = "Store chunked documents and run vector similarity search over them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure named connections and search defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a document JSON file, one row per chunk
    Add {
        /// Path to the document JSON file
        document: PathBuf,
        /// Override the document's connection name
        #[arg(long)]
        connection: Option<String>,
        /// Override the document's collection (table) name
        #[arg(long)]
        collection: Option<String>,
    },
    /// Find the chunks most similar to an embedding
    Search {
        /// Connection name to query
        #[arg(long)]
        connection: String,
        /// Collection (table) to search
        #[arg(long)]
        collection: String,
        #[command(flatten)]
        embedding: EmbeddingArgs,
        /// Number of results to return (defaults to the configured value)
        #[arg(long)]
        max_results: Option<usize>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct EmbeddingArgs {
    /// Query embedding as comma-separated floats
    #[arg(long, allow_hyphen_values = true)]
    embedding: Option<String>,
    /// File holding the query embedding as a JSON array
    #[arg(long)]
    embedding_file: Option<PathBuf>,
}

impl EmbeddingArgs {
    fn into_source(self) -> Option<EmbeddingSource> {
        self.embedding
            .map(EmbeddingSource::Inline)
            .or_else(|| self.embedding_file.map(EmbeddingSource::File))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Add {
            document,
            connection,
            collection,
        } => {
            let config = Config::load_default()?;
            add_document(&config, &document, connection, collection).await?;
        }
        Commands::Search {
            connection,
            collection,
            embedding,
            max_results,
        } => {
            let config = Config::load_default()?;
            let Some(source) = embedding.into_source() else {
                anyhow::bail!("Either --embedding or --embedding-file is required");
            };
            search(&config, connection, collection, &source, max_results).await?;
        }
    }

    Ok(())
}
