// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Brainstore CLI
//!
//! Command-line interface for brainstore memory operations.

use anyhow::{bail, Context, Result};
use brainstore_core::{RecordDraft, DEFAULT_KIND};
use brainstore_index::ScorerType;
use brainstore_memory::{Brain, BrainConfig, Priority, RecallMode, RecallQuery};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "brainstore")]
#[command(about = "Brainstore - versioned memory store with relevance recall", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "BRAINSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage root (overrides configuration)
    #[arg(short, long)]
    base_path: Option<PathBuf>,

    /// Scorer: keyword, vector or hashed-vector (overrides configuration)
    #[arg(long)]
    scorer: Option<ScorerType>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a record
    Write {
        /// Record content
        content: Option<String>,

        /// Record kind
        #[arg(long, default_value = DEFAULT_KIND)]
        kind: String,

        /// Priority: P0, P1 or P2
        #[arg(short, long, default_value = "P1")]
        priority: String,

        /// Origin label
        #[arg(long)]
        source: Option<String>,

        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Expiry hint in seconds
        #[arg(long)]
        ttl: Option<i64>,

        /// Metadata entry as key=value (repeatable); JSON values are parsed
        #[arg(short, long = "meta")]
        meta: Vec<String>,

        /// Read one JSON record per line from stdin instead
        #[arg(long, conflicts_with = "content")]
        stdin: bool,
    },

    /// Recall records relevant to a query
    Retrieve {
        /// Query text
        query: String,

        /// Recall mode: facts, strategy or general
        #[arg(short, long, default_value = "facts")]
        mode: String,

        /// Maximum results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Minimum score
        #[arg(long, default_value = "0.0")]
        min_score: f64,

        /// Only consider this priority (repeatable)
        #[arg(long = "priority")]
        priorities: Vec<Priority>,
    },

    /// Compact pending writes into a new snapshot version
    Checkpoint,

    /// Restore a snapshot version
    Rollback {
        /// Version name, as printed by `versions`
        version: String,
    },

    /// List snapshot versions, newest first
    Versions,

    /// Attach model embeddings to records that lack one
    Backfill {
        /// Stop after scanning this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show store statistics
    Stats,

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;
    if let Commands::Config = cli.command {
        return emit(cli.json, &config, |c| format!("{:#?}", c));
    }

    let brain = Brain::configure(config).context("Failed to open brain")?;
    run(&brain, cli.command, cli.json)
}

fn load_config(cli: &Cli) -> Result<BrainConfig> {
    let mut config = BrainConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    if let Some(path) = &cli.base_path {
        config.base_path = path.clone();
    }
    if let Some(scorer) = cli.scorer {
        config.scorer_type = scorer;
    }
    debug!(?config, "Effective configuration");
    Ok(config)
}

fn run(brain: &Brain, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Write {
            content,
            kind,
            priority,
            source,
            tags,
            ttl,
            meta,
            stdin,
        } => {
            if stdin {
                return write_from_stdin(brain, json);
            }
            let Some(content) = content else {
                bail!("Nothing to write: pass CONTENT or --stdin");
            };

            let mut draft = RecordDraft::new(content)
                .kind(kind)
                .raw_priority(priority)
                .tags(tags);
            if let Some(source) = source {
                draft = draft.source(source);
            }
            if let Some(ttl) = ttl {
                draft = draft.ttl_seconds(ttl);
            }
            for entry in &meta {
                let (key, value) = parse_meta(entry)?;
                draft = draft.meta(key, value);
            }

            match brain.write(draft)? {
                Some(record) => emit(json, &record, |r| format!("✓ Stored {} ({})", r.id, r.hash))?,
                None => emit(json, &Value::Null, |_| "Skipped: duplicate or disabled brain".into())?,
            }
        }

        Commands::Retrieve {
            query,
            mode,
            limit,
            min_score,
            priorities,
        } => {
            let mode: RecallMode = mode.parse().unwrap_or_default();
            let mut request = RecallQuery::new(query)
                .mode(mode)
                .limit(limit)
                .min_score(min_score);
            if !priorities.is_empty() {
                request = request.priorities(priorities);
            }

            let hits = brain.retrieve(&request)?;
            emit(json, &hits, |hits| {
                if hits.is_empty() {
                    return "No matching records".into();
                }
                hits.iter()
                    .map(|h| {
                        format!(
                            "{:.4}  [{}] {:<8} {}",
                            h.score, h.record.priority, h.record.kind, h.record.content
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }

        Commands::Checkpoint => match brain.checkpoint()? {
            Some(summary) => emit(json, &summary, |s| {
                format!(
                    "✓ Checkpoint {}: {} records (from {})",
                    s.version, s.snapshot_count, s.compacted_from
                )
            })?,
            None => emit(json, &Value::Null, |_| "Brain disabled".into())?,
        },

        Commands::Rollback { version } => {
            if !brain.rollback(&version)? {
                bail!("Unknown version: {}", version);
            }
            info!(%version, "Rolled back");
            emit(json, &serde_json::json!({ "version": version }), |_| {
                format!("✓ Rolled back to {}", version)
            })?;
        }

        Commands::Versions => {
            let versions = brain.list_versions()?;
            emit(json, &versions, |v| v.join("\n"))?;
        }

        Commands::Backfill { limit } => {
            let summary = brain.backfill_embeddings(limit)?;
            emit(json, &summary, |s| {
                format!(
                    "Scanned {}, updated {}, skipped {}",
                    s.scanned, s.updated, s.skipped
                )
            })?;
        }

        Commands::Stats => {
            let stats = brain.stats()?;
            emit(json, &stats, |s| {
                format!(
                    "Scorer:           {}\nEmbedding model:  {}\nSnapshot records: {}\nPending records:  {}\nPending usage:    {}\nVersions:         {}\nArchives:         {}",
                    s.scorer,
                    s.embedding_model.as_deref().unwrap_or("-"),
                    s.store.snapshot_records,
                    s.store.pending_records,
                    s.store.pending_usage,
                    s.store.versions,
                    s.store.archives
                )
            })?;
        }

        Commands::Config => unreachable!("handled before the brain is opened"),
    }

    Ok(())
}

/// Write one JSON record per stdin line; blank lines are skipped
fn write_from_stdin(brain: &Brain, json: bool) -> Result<()> {
    let mut stored = 0usize;
    let mut skipped = 0usize;

    for (n, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Line {} is not valid JSON", n + 1))?;
        match brain
            .write_value(value)
            .with_context(|| format!("Line {} is not a valid record", n + 1))?
        {
            Some(_) => stored += 1,
            None => skipped += 1,
        }
    }

    emit(
        json,
        &serde_json::json!({ "stored": stored, "skipped": skipped }),
        |_| format!("✓ Stored {}, skipped {}", stored, skipped),
    )
}

/// Split `key=value`; the value is parsed as JSON when it is valid JSON
fn parse_meta(entry: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = entry.split_once('=') else {
        bail!("Invalid metadata entry '{}', expected key=value", entry);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid metadata entry '{}', empty key", entry);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Print `value` as pretty JSON or through the human formatter
fn emit<T, F>(json: bool, value: &T, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let text = human(value);
        if !text.is_empty() {
            println!("{}", text);
        }
    }
    Ok(())
}
