//! chunkvault CLI entry point

use chunkvault::{
    commands::{
        cmd_add, cmd_add_chunk, cmd_delete, cmd_delete_chunk, cmd_get, cmd_init, cmd_reindex,
        cmd_search, cmd_stats, print_chunk, print_document, print_init_report, print_models,
        print_reindex_stats, print_search_results, print_stats, AddOptions, InitOptions,
    },
    config::Config,
    engine::Engine,
    error::{Error, Result},
    mcp::McpServer,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "chunkvault")]
#[command(version, about = "Hybrid lexical and vector document search with MCP server support", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "CHUNKVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config, database and ANN index files
    Init {
        /// Overwrite an existing config with the defaults
        #[arg(long)]
        force: bool,
    },

    /// Add a document; each --text and each --file becomes one chunk
    Add {
        /// Document id
        id: String,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,

        /// Chunk text (repeatable)
        #[arg(short, long = "text")]
        texts: Vec<String>,

        /// File whose contents become one chunk (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Replace an existing document with the same id
        #[arg(long)]
        overwrite: bool,

        /// Append a generated summary chunk
        #[arg(long)]
        summarize: bool,
    },

    /// Show a document
    Get {
        id: String,

        /// Include the document's chunks
        #[arg(long)]
        chunks: bool,
    },

    /// Delete a document and all of its chunks
    Delete { id: String },

    /// Append one chunk to an existing document
    AddChunk {
        document_id: String,
        text: String,
    },

    /// Show a chunk
    GetChunk { id: String },

    /// Delete a single chunk
    DeleteChunk { id: String },

    /// Search with bm25 or an embedding model
    Search {
        query: String,

        /// Model id, or bm25 for lexical search
        #[arg(short, long, default_value = "bm25")]
        model: String,

        /// Maximum number of results; invalid values fall back to the default
        #[arg(short, long, allow_hyphen_values = true)]
        limit: Option<String>,
    },

    /// List searchable models
    Models,

    /// Rebuild ANN graphs from stored embeddings
    Reindex {
        /// Only rebuild these models
        #[arg(long)]
        model: Option<Vec<String>>,
    },

    /// Show store and graph statistics
    Stats,

    /// Start MCP server on stdio
    Mcp,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout belongs to command output and the MCP protocol
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config, force, cli.json).await;
    }

    let config = load_config(cli.config.as_deref())?;
    let engine = Engine::open(&config).await?;

    // The server closes the engine when stdin ends
    if let Commands::Mcp = cli.command {
        return McpServer::new(engine).run().await;
    }

    let result = dispatch(cli.command, cli.json, &config, &engine).await;
    engine.close().await;
    result
}

async fn dispatch(command: Commands, json: bool, config: &Config, engine: &Engine) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Mcp => unreachable!(),

        Commands::Add {
            id,
            title,
            description,
            metadata,
            texts,
            files,
            overwrite,
            summarize,
        } => {
            let options = AddOptions {
                id,
                title,
                description,
                metadata,
                texts,
                files,
                overwrite,
                summarize,
            };
            let result = cmd_add(engine, options).await?;
            if json {
                print_json(&result)?;
            } else {
                println!(
                    "✓ Added document '{}' with {} chunk(s)",
                    result.document_id, result.chunks
                );
            }
        }

        Commands::Get { id, chunks } => {
            let view = cmd_get(engine, &id, chunks).await?;
            if json {
                print_json(&view)?;
            } else {
                print_document(&view);
            }
        }

        Commands::Delete { id } => {
            let chunks = cmd_delete(engine, &id).await?;
            if json {
                print_json(&serde_json::json!({ "document_id": id, "chunks_deleted": chunks }))?;
            } else {
                println!("✓ Deleted document '{}' ({} chunk(s))", id, chunks);
            }
        }

        Commands::AddChunk { document_id, text } => {
            let chunk = cmd_add_chunk(engine, &document_id, &text).await?;
            if json {
                print_json(&chunk)?;
            } else {
                println!("✓ Added chunk {} to '{}'", chunk.id, document_id);
            }
        }

        Commands::GetChunk { id } => {
            let chunk = engine.get_chunk(&id).await?;
            if json {
                print_json(&chunk)?;
            } else {
                print_chunk(&chunk);
            }
        }

        Commands::DeleteChunk { id } => {
            cmd_delete_chunk(engine, &id).await?;
            if json {
                print_json(&serde_json::json!({ "chunk_id": id, "deleted": true }))?;
            } else {
                println!("✓ Deleted chunk {}", id);
            }
        }

        Commands::Search {
            query,
            model,
            limit,
        } => {
            let output = cmd_search(engine, &model, &query, limit.as_deref()).await?;
            if json {
                print_json(&output)?;
            } else {
                print_search_results(&output);
            }
        }

        Commands::Models => {
            let models = engine.list_models();
            if json {
                print_json(&models)?;
            } else {
                print_models(&models);
            }
        }

        Commands::Reindex { model } => {
            let stats = cmd_reindex(engine, model).await?;
            if json {
                print_json(&stats)?;
            } else {
                print_reindex_stats(&stats);
            }
        }

        Commands::Stats => {
            let info = cmd_stats(config, engine).await?;
            if json {
                print_json(&info)?;
            } else {
                print_stats(&info);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_init(config: Option<PathBuf>, force: bool, json: bool) -> Result<()> {
    // A .toml path names the config file; any other path names its directory
    let (base_dir, config_path) = if let Some(path) = config {
        if path.extension().map_or(false, |e| e == "toml") {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        } else {
            (path.clone(), path.join("config.toml"))
        }
    } else {
        let base = Config::default_base_dir();
        (base.clone(), base.join("config.toml"))
    };

    let report = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
    })
    .await?;

    if json {
        print_json(&report)?;
    } else {
        print_init_report(&report);
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}. Run 'chunkvault init' first.",
            config_path.display()
        )));
    }

    Config::load(&config_path)
}
