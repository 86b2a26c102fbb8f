//! StashKV - A Cache-Coherent Key/Document Store
//!
//! Command-line front end. Opens a named index under a data directory, runs
//! one command through the cached store, and closes the index so every write
//! is committed before exit.

use anyhow::{bail, Context};
use bytes::Bytes;
use stashkv::index::{CommitMode, IndexConfig, IndexManager};
use stashkv::{
    CachedStore, DocStore, Document, FieldMatch, FieldValue, IndexDocStore, IndexKvStore,
    KvStore, MemoryCache, StoreConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Maximum number of keys printed by `find`
const DEFAULT_FIND_LIMIT: usize = 100;

/// A single CLI command
#[derive(Debug)]
enum Command {
    Put { space: String, key: String, value: String },
    Get { space: String, key: String },
    Delete { space: String, key: String },
    Exists { space: String, key: String },
    Size { space: String },
    Find { space: String, field: String, value: String },
}

/// CLI configuration
#[derive(Debug)]
struct Config {
    /// Root directory holding every index
    dir: PathBuf,
    /// Index name under the root
    index: String,
    /// Commit in the background instead of per write
    async_commit: bool,
    /// Background commit period
    commit_interval_ms: u64,
    /// Store JSON documents instead of raw bytes
    documents: bool,
    /// Force full-text matching in `find`
    token: bool,
    /// Maximum keys returned by `find`
    limit: usize,
    command: Command,
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let mut dir = PathBuf::from("stashkv-data");
        let mut index = "default".to_string();
        let mut async_commit = false;
        let mut commit_interval_ms = 1_000;
        let mut documents = false;
        let mut token = false;
        let mut limit = DEFAULT_FIND_LIMIT;
        let mut positional = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--dir" | "-d" => {
                    dir = PathBuf::from(required_value(&args, i, "--dir"));
                    i += 2;
                }
                "--index" | "-i" => {
                    index = required_value(&args, i, "--index").to_string();
                    i += 2;
                }
                "--async" => {
                    async_commit = true;
                    i += 1;
                }
                "--commit-interval" => {
                    commit_interval_ms = required_value(&args, i, "--commit-interval")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid commit interval");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--kd" => {
                    documents = true;
                    i += 1;
                }
                "--token" => {
                    token = true;
                    i += 1;
                }
                "--limit" => {
                    limit = required_value(&args, i, "--limit")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid limit");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("StashKV version {}", stashkv::VERSION);
                    std::process::exit(0);
                }
                arg if arg.starts_with("--") => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
                _ => {
                    positional.push(args[i].clone());
                    i += 1;
                }
            }
        }

        let command = parse_command(positional).unwrap_or_else(|message| {
            eprintln!("Error: {}", message);
            print_help();
            std::process::exit(1);
        });

        Self {
            dir,
            index,
            async_commit,
            commit_interval_ms,
            documents,
            token,
            limit,
            command,
        }
    }

    fn index_config(&self) -> IndexConfig {
        let mode = if self.async_commit {
            CommitMode::Async
        } else {
            CommitMode::Sync
        };
        IndexConfig::default()
            .with_commit_mode(mode)
            .with_commit_interval_ms(self.commit_interval_ms)
    }
}

fn required_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn parse_command(positional: Vec<String>) -> Result<Command, String> {
    let mut args = positional.into_iter();
    let name = args.next().ok_or("missing command")?;
    let rest: Vec<String> = args.collect();

    let arity = |count: usize| -> Result<(), String> {
        if rest.len() == count {
            Ok(())
        } else {
            Err(format!(
                "{} takes {} argument(s), got {}",
                name,
                count,
                rest.len()
            ))
        }
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "put" => {
            arity(3)?;
            Command::Put {
                space: rest[0].clone(),
                key: rest[1].clone(),
                value: rest[2].clone(),
            }
        }
        "get" => {
            arity(2)?;
            Command::Get {
                space: rest[0].clone(),
                key: rest[1].clone(),
            }
        }
        "delete" | "del" => {
            arity(2)?;
            Command::Delete {
                space: rest[0].clone(),
                key: rest[1].clone(),
            }
        }
        "exists" => {
            arity(2)?;
            Command::Exists {
                space: rest[0].clone(),
                key: rest[1].clone(),
            }
        }
        "size" => {
            arity(1)?;
            Command::Size {
                space: rest[0].clone(),
            }
        }
        "find" => {
            arity(3)?;
            Command::Find {
                space: rest[0].clone(),
                field: rest[1].clone(),
                value: rest[2].clone(),
            }
        }
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(command)
}

fn print_help() {
    println!(
        r#"
StashKV - A Cache-Coherent Key/Document Store

USAGE:
    stashkv [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
    put <SPACE> <KEY> <VALUE>      Store a value (a JSON object with --kd)
    get <SPACE> <KEY>              Print a value
    delete <SPACE> <KEY>           Remove a value
    exists <SPACE> <KEY>           Print 1 if the key exists, 0 otherwise
    size <SPACE>                   Print the number of entries in a space
    find <SPACE> <FIELD> <VALUE>   Print keys whose document field matches (--kd only)

OPTIONS:
    -d, --dir <PATH>               Data directory (default: ./stashkv-data)
    -i, --index <NAME>             Index name (default: default)
        --kd                       Store JSON documents instead of raw values
        --async                    Commit in the background
        --commit-interval <MS>     Background commit period (default: 1000)
        --token                    find: match a full-text token
        --limit <N>                find: maximum keys to print (default: 100)
    -v, --version                  Print version information
    -h, --help                     Print this help message

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=debug) to change the log level.

EXAMPLES:
    stashkv put sessions abc123 "user=42"
    stashkv --kd put users 42 '{{"name": "Ada Lovelace", "age": 36, "active": true}}'
    stashkv --kd find users age 36
    stashkv --kd --token find users name lovelace
"#
    );
}

// ============================================================================
// JSON <-> Document
// ============================================================================

fn document_from_json(text: &str) -> anyhow::Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(text).context("document must be valid JSON")?;
    let serde_json::Value::Object(map) = value else {
        bail!("document must be a JSON object");
    };

    let mut doc = Document::new();
    for (name, value) in map {
        let field = match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => FieldValue::Str(s),
            _ => bail!("field {:?} must be a scalar", name),
        };
        doc.insert(name, field);
    }
    Ok(doc)
}

fn document_to_json(doc: &Document) -> serde_json::Value {
    let map = doc
        .iter()
        .map(|(name, value)| {
            let json = match value {
                FieldValue::Null => serde_json::Value::Null,
                FieldValue::Bool(b) => serde_json::Value::from(*b),
                FieldValue::Char(c) => serde_json::Value::from(c.to_string()),
                FieldValue::Int(i) => serde_json::Value::from(*i),
                FieldValue::Float(f) => serde_json::Value::from(*f),
                FieldValue::Str(s) => serde_json::Value::from(s.as_str()),
                FieldValue::Bytes(b) => serde_json::Value::from(b.clone()),
            };
            (name.to_string(), json)
        })
        .collect();
    serde_json::Value::Object(map)
}

/// Picks how `find` compares a command-line value.
fn infer_match(value: &str, token: bool) -> FieldMatch {
    if token {
        return FieldMatch::Token(value.to_string());
    }
    if let Ok(i) = value.parse::<i64>() {
        return FieldMatch::Long(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return FieldMatch::Double(f);
    }
    match value {
        "true" => FieldMatch::Long(1),
        "false" => FieldMatch::Long(0),
        _ if value.chars().any(char::is_whitespace) => FieldMatch::Token(value.to_string()),
        _ => FieldMatch::Exact(value.to_string()),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn run_kv(manager: &IndexManager, config: &Config) -> anyhow::Result<()> {
    let store: KvStore<IndexKvStore> = CachedStore::new(
        manager.open_kv(&config.index)?,
        Arc::new(MemoryCache::new()),
        StoreConfig::default(),
    );

    match &config.command {
        Command::Put { space, key, value } => {
            store.put(space, key, Bytes::from(value.clone()), None)?;
            println!("OK");
        }
        Command::Get { space, key } => match store.get(space, key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Command::Delete { space, key } => {
            store.delete(space, key, None)?;
            println!("OK");
        }
        Command::Exists { space, key } => println!("{}", u8::from(store.exists(space, key)?)),
        Command::Size { space } => println!("{}", store.size(space)?),
        Command::Find { .. } => bail!("find needs a document index (--kd)"),
    }

    debug!(stats = ?store.stats(), "Command finished");
    Ok(())
}

fn run_doc(manager: &IndexManager, config: &Config) -> anyhow::Result<()> {
    let engine = manager.open_doc(&config.index)?;
    let store: DocStore<IndexDocStore> = CachedStore::new(
        Arc::clone(&engine),
        Arc::new(MemoryCache::new()),
        StoreConfig::default(),
    );

    match &config.command {
        Command::Put { space, key, value } => {
            store.put(space, key, document_from_json(value)?, None)?;
            println!("OK");
        }
        Command::Get { space, key } => match store.get(space, key)? {
            Some(doc) => println!("{}", document_to_json(&doc)),
            None => println!("(nil)"),
        },
        Command::Delete { space, key } => {
            store.delete(space, key, None)?;
            println!("OK");
        }
        Command::Exists { space, key } => println!("{}", u8::from(store.exists(space, key)?)),
        Command::Size { space } => println!("{}", store.size(space)?),
        Command::Find {
            space,
            field,
            value,
        } => {
            let matcher = infer_match(value, config.token);
            debug!(matcher = ?matcher, "Searching");
            for key in engine.find_keys(space, field, &matcher, config.limit)? {
                println!("{}", key);
            }
        }
    }

    debug!(stats = ?store.stats(), "Command finished");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; results go to stdout, logs to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        dir = %config.dir.display(),
        index = %config.index,
        async_commit = config.async_commit,
        "StashKV v{}",
        stashkv::VERSION
    );

    let manager = IndexManager::new(&config.dir, config.index_config());

    let outcome = if config.documents {
        run_doc(&manager, &config)
    } else {
        run_kv(&manager, &config)
    };

    // Always close so async writes get their final commit
    manager
        .close_all()
        .context("failed to close indexes cleanly")?;

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_command() {
        let command = parse_command(args(&["put", "users", "42", "ada"])).unwrap();
        assert!(matches!(command, Command::Put { ref value, .. } if value == "ada"));

        assert!(matches!(
            parse_command(args(&["SIZE", "users"])).unwrap(),
            Command::Size { .. }
        ));
        assert!(parse_command(args(&["get", "users"])).is_err());
        assert!(parse_command(args(&["flush"])).is_err());
        assert!(parse_command(Vec::new()).is_err());
    }

    #[test]
    fn test_document_json_round_trip() {
        let doc =
            document_from_json(r#"{"name": "Ada Lovelace", "age": 36, "score": 9.5, "x": null}"#)
                .unwrap();

        assert_eq!(doc.get("age"), Some(&FieldValue::Int(36)));
        assert_eq!(doc.get("score"), Some(&FieldValue::Float(9.5)));
        assert_eq!(doc.get("x"), Some(&FieldValue::Null));

        let json = document_to_json(&doc);
        assert_eq!(json["name"], "Ada Lovelace");
        assert_eq!(json["age"], 36);

        assert!(document_from_json("[1, 2]").is_err());
        assert!(document_from_json(r#"{"nested": {"a": 1}}"#).is_err());
    }

    #[test]
    fn test_infer_match() {
        assert_eq!(infer_match("36", false), FieldMatch::Long(36));
        assert_eq!(infer_match("9.5", false), FieldMatch::Double(9.5));
        assert_eq!(infer_match("true", false), FieldMatch::Long(1));
        assert_eq!(infer_match("ada", false), FieldMatch::Exact("ada".into()));
        assert_eq!(
            infer_match("ada lovelace", false),
            FieldMatch::Token("ada lovelace".into())
        );
        assert_eq!(infer_match("ada", true), FieldMatch::Token("ada".into()));
    }
}
