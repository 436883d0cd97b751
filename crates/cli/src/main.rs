use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vecstash_core::config;
use vecstash_core::{FileRecordStore, HnswConfig, IndexManager, NewRecord, RecordPatch};

#[derive(Parser)]
#[command(name = "vecstash", about = "Local embedding store with HNSW search")]
struct Args {
    /// Directory holding the record file
    #[arg(short, long, env = "VECSTASH_DATA_DIR", default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Maximum HNSW neighbors per node per layer
    #[arg(long, default_value_t = config::HNSW_DEFAULT_M)]
    m: usize,

    /// HNSW search beam width
    #[arg(long, default_value_t = config::HNSW_DEFAULT_EF_SEARCH)]
    ef_search: usize,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new record and print its id
    Add {
        #[arg(long)]
        text: String,
        /// Comma-separated embedding, e.g. "0.1,0.2,0.3"
        #[arg(long)]
        vector: String,
        #[arg(long)]
        model: Option<String>,
        /// Metadata entry KEY=VALUE (VALUE parsed as JSON, else kept as a string)
        #[arg(long = "meta")]
        meta: Vec<String>,
    },
    /// Patch a record and print it
    Update {
        id: Uuid,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        vector: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long = "meta")]
        meta: Vec<String>,
    },
    /// Delete a record
    Delete { id: Uuid },
    /// Print a record as JSON
    Get { id: Uuid },
    /// List records, newest first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Nearest records to a query vector
    Search {
        #[arg(long)]
        vector: String,
        #[arg(short = 'k', long, default_value_t = config::DEFAULT_TOP_K)]
        top_k: usize,
        /// Scan every record instead of using the HNSW graph
        #[arg(long, default_value_t = false)]
        exact: bool,
    },
    /// Import records from a JSON array file
    Import { file: PathBuf },
    /// Export all records as JSON
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print record statistics as JSON
    Stats,
    /// Delete every record
    Clear,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::from_default_env()
        .add_directive("vecstash_core=info".parse().expect("valid directive literal"))
        .add_directive("vecstash=info".parse().expect("valid directive literal"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Parses a comma-separated list of floats.
fn parse_vector(raw: &str) -> Result<Vec<f32>, String> {
    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f32>()
                .map_err(|e| format!("invalid vector component '{s}': {e}"))
        })
        .collect::<Result<Vec<f32>, String>>()?;
    if values.is_empty() {
        return Err("vector must have at least one component".to_string());
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err("vector components must be finite".to_string());
    }
    Ok(values)
}

fn parse_meta(entries: &[String]) -> Result<HashMap<String, serde_json::Value>, String> {
    entries
        .iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| format!("metadata entry '{entry}' is not KEY=VALUE"))?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

fn vector_or_exit(raw: &str) -> Vec<f32> {
    parse_vector(raw).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_json);

    if args.m == 0 {
        eprintln!("Error: --m must be > 0");
        std::process::exit(2);
    }
    if args.data_dir.exists() && !args.data_dir.is_dir() {
        eprintln!(
            "Error: data_dir '{}' exists but is not a directory",
            args.data_dir.display()
        );
        std::process::exit(1);
    }

    let hnsw_config = HnswConfig {
        m: args.m,
        ef_search: args.ef_search,
        ..HnswConfig::default()
    };
    let store = FileRecordStore::open(&args.data_dir)?;
    let manager = IndexManager::new(store, hnsw_config);

    match args.command {
        Command::Add {
            text,
            vector,
            model,
            meta,
        } => {
            let embedding = vector_or_exit(&vector);
            let mut new = NewRecord::new(text, embedding);
            new.model = model;
            new.metadata = parse_meta(&meta)?;
            let record = manager.add_record(new).await?;
            println!("{}", record.id);
        }
        Command::Update {
            id,
            text,
            vector,
            model,
            meta,
        } => {
            let patch = RecordPatch {
                text,
                embedding: vector.as_deref().map(vector_or_exit),
                model,
                metadata: if meta.is_empty() {
                    None
                } else {
                    Some(parse_meta(&meta)?)
                },
            };
            let record = manager.update_record(id, patch).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Delete { id } => {
            if manager.delete_record(id).await? {
                println!("deleted {}", id);
            } else {
                println!("{} not found", id);
            }
        }
        Command::Get { id } => match manager.get_record(id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => {
                eprintln!("{} not found", id);
                std::process::exit(1);
            }
        },
        Command::List { limit } => {
            let records = manager.list_records().await?;
            let limit = limit.unwrap_or(records.len());
            for record in records.iter().take(limit) {
                println!("{}\t{}\t{}", record.id, record.timestamp, record.text);
            }
        }
        Command::Search {
            vector,
            top_k,
            exact,
        } => {
            let query = vector_or_exit(&vector);
            let results = if exact {
                manager.search_exact(&query, top_k).await?
            } else {
                manager.search(&query, top_k).await?
            };
            for hit in &results {
                println!("{:.4}\t{}\t{}", hit.similarity, hit.record.id, hit.record.text);
            }
        }
        Command::Import { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let imported = manager.import_json(&raw).await?;
            println!("{}", imported);
        }
        Command::Export { out } => {
            let json = manager.export_json().await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    tracing::info!("Wrote export to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Command::Stats => {
            let stats = manager.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Clear => {
            manager.clear().await?;
            println!("cleared");
        }
    }

    Ok(())
}
