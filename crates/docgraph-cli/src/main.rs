//! docgraph CLI
//!
//! Command-line access to a docgraph store:
//! - Importing and exporting a user's whole graph as JSON
//! - Searching entities and walking bounded neighbourhoods
//! - Inspecting the per-user summary index
//! - Deleting entities (with relation cascade) and clearing users
//!
//! Results go to stdout as pretty JSON; status lines go to stderr.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use docgraph_core::{GraphStorage, GraphStoreConfig, KnowledgeGraph, UserGraphStorage};
use docgraph_store::BackendConfig;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docgraph")]
#[command(author, version, about = "docgraph: paginated knowledge-graph storage")]
struct Cli {
    /// Data directory for the JSON-file engine (in-memory when omitted)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG wins when set
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a `{entities, relations}` JSON file for a user
    Import {
        #[arg(long)]
        user: String,
        /// Input graph JSON
        input: PathBuf,
    },

    /// Write all of a user's entities and relations as JSON
    Export {
        #[arg(long)]
        user: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Ranked free-text search over a user's entities
    Search {
        #[arg(long)]
        user: String,
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Entities and relations within `depth` hops of an entity
    Neighbors {
        #[arg(long)]
        user: String,
        entity: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },

    /// Per-user summary (counts, entity types, recent entities, terms)
    Summary {
        #[arg(long)]
        user: String,
    },

    /// List users that own at least one entity
    Users,

    /// Delete an entity and every relation touching it
    DeleteEntity {
        #[arg(long)]
        user: String,
        entity: String,
    },

    /// Remove all entities, relations and the summary of a user
    Clear {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
    tracing::debug!(backend = ?config.backend, "opening graph storage");
    let storage = GraphStorage::open(config);
    storage
        .connect()
        .await
        .context("failed to open document store")?;

    let result = run(&storage, cli.command).await;
    storage.shutdown().await;
    result
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config: Option<&Path>, data_dir: Option<&Path>) -> Result<GraphStoreConfig> {
    let mut loaded = match config {
        Some(path) => GraphStoreConfig::from_json_file(path)?,
        None => GraphStoreConfig::default(),
    };
    if let Some(dir) = data_dir {
        loaded = loaded.with_backend(BackendConfig::JsonFile {
            dir: dir.to_path_buf(),
        });
    }
    Ok(loaded)
}

async fn run(storage: &GraphStorage, command: Commands) -> Result<()> {
    match command {
        Commands::Import { user, input } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let graph: KnowledgeGraph = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a graph document", input.display()))?;
            storage.save_for_user(&user, &graph).await?;
            eprintln!(
                "{} imported {} entities, {} relations for {}",
                "ok".green().bold(),
                graph.entities.len(),
                graph.relations.len(),
                user.bold()
            );
        }
        Commands::Export { user, out } => {
            let graph = storage.load_for_user(&user).await?;
            match out {
                Some(path) => {
                    fs::write(&path, serde_json::to_string_pretty(&graph)?)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
                }
                None => print_json(&graph)?,
            }
        }
        Commands::Search { user, query, limit } => {
            let hits = storage.search_entities(&user, &query, limit).await?;
            if hits.is_empty() {
                eprintln!("{} no entities match {:?}", "info:".yellow().bold(), query);
            }
            print_json(&hits)?;
        }
        Commands::Neighbors {
            user,
            entity,
            depth,
        } => {
            let graph = storage.get_connected_entities(&user, &entity, depth).await?;
            print_json(&graph)?;
        }
        Commands::Summary { user } => {
            let summary = storage.get_user_summary(&user).await?;
            print_json(&summary)?;
        }
        Commands::Users => {
            print_json(&storage.list_users().await?)?;
        }
        Commands::DeleteEntity { user, entity } => {
            if storage.delete_entity(&user, &entity).await? {
                eprintln!("{} deleted {}", "ok".green().bold(), entity.bold());
            } else {
                eprintln!("{} no entity {}", "info:".yellow().bold(), entity.bold());
            }
        }
        Commands::Clear { user } => {
            storage.clear_for_user(&user).await?;
            eprintln!("{} cleared {}", "ok".green().bold(), user.bold());
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
