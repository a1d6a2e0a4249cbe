//! # Knowledge Harness CLI (`kb`)
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and schema |
//! | `kb reindex <path>...` | Scan corpora and upsert every document |
//! | `kb search "<term>"` | Full-text search with filters |
//! | `kb list` | Filtered listing |
//! | `kb get <slug>` / `kb get --id <id>` | Show one document |
//! | `kb resolve <filename>` | Resolve a link target to a document |
//! | `kb roadmap <knowledgebase>` | Prerequisite graph |
//! | `kb check <file>` / `kb admit <file>` | Duplicate vetting for new documents |
//! | `kb dupes <path>` | Corpus-wide duplicate scan |
//! | `kb links <path>` | Report links whose target file is gone |
//! | `kb stats` / `kb topics <knowledgebase>` | Summaries |
//! | `kb projects ...` | Project brief pipeline |
//!
//! Logging goes to stderr and is controlled by `KB_LOG` (default `info`).

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use knowledge_harness::config::{self, Config};
use knowledge_harness::get::Lookup;
use knowledge_harness::progress::ProgressMode;
use knowledge_harness::{authoring, get, ingest, links, migrate, projects, roadmap, search, stats};
use knowledge_harness_core::models::{Level, QueryFilters};

/// Knowledge Harness: markdown knowledge-base ingestion, search, duplicate
/// vetting and prerequisite roadmaps.
#[derive(Parser)]
#[command(name = "kb", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Filters shared by `search` and `list`.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only this level (beginner, intermediate, advanced, overachiever).
    #[arg(long, value_parser = parse_level)]
    level: Option<Level>,

    #[arg(long)]
    knowledgebase: Option<String>,

    /// Only documents under a `/<topic>/` path segment.
    #[arg(long)]
    topic: Option<String>,

    /// Match any of these tags. Repeatable.
    #[arg(long = "tag")]
    tags: Vec<String>,
}

impl From<FilterArgs> for QueryFilters {
    fn from(args: FilterArgs) -> Self {
        QueryFilters {
            level: args.level,
            knowledgebase: args.knowledgebase,
            topic: args.topic,
            tags: args.tags,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Scan one or more corpus directories and upsert every document.
    ///
    /// Each directory is one knowledgebase, named after the directory.
    /// Corpora are processed concurrently.
    Reindex {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Parse and count without writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Full-text search over title, content and tags.
    Search {
        term: String,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long)]
        json: bool,
    },

    /// List documents, ordered by sequence number.
    List {
        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long)]
        json: bool,
    },

    /// Show one document by slug, or by canonical id with `--id`.
    Get {
        #[arg(required_unless_present = "id")]
        slug: Option<String>,

        #[arg(long, conflicts_with = "slug")]
        id: Option<String>,

        #[arg(long)]
        knowledgebase: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Resolve a canonical id, slug or link filename to a document.
    Resolve {
        reference: String,

        #[arg(long)]
        knowledgebase: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Build the prerequisite roadmap for a knowledgebase.
    Roadmap {
        knowledgebase: String,

        #[arg(long)]
        topic: Option<String>,

        /// Write the roadmap as JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Report key collisions and similar documents for a new file.
    Check {
        file: PathBuf,

        #[arg(long)]
        knowledgebase: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Store a new file unless it collides or is too similar to existing content.
    Admit {
        file: PathBuf,

        #[arg(long)]
        knowledgebase: Option<String>,
    },

    /// Scan a corpus on disk for duplicate pairs. Exits non-zero if any are found.
    Dupes {
        path: PathBuf,

        /// Similarity threshold (defaults to `similarity.reject_threshold`).
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Check document links in a corpus against the disk and the index.
    /// Exits non-zero if any link resolves to nothing.
    Links {
        path: PathBuf,

        /// Also fail on stale links the index can still resolve.
        #[arg(long)]
        strict: bool,
    },

    /// Database and per-knowledgebase counts.
    Stats,

    /// Topics within a knowledgebase.
    Topics { knowledgebase: String },

    /// Project brief pipeline.
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Scan a brief corpus (defaults to `projects.root`).
    Index { path: Option<PathBuf> },

    List {
        #[arg(long)]
        topic: Option<String>,

        #[arg(long, value_parser = parse_level)]
        level: Option<Level>,
    },

    Show {
        slug: String,

        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        json: bool,
    },

    Topics,
}

fn parse_level(s: &str) -> Result<Level, String> {
    s.parse()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // `dupes` works on disk only; a config file is optional.
    if let Commands::Dupes { path, threshold } = &cli.command {
        let cfg = if cli.config.exists() {
            config::load_config(&cli.config)?
        } else {
            Config::minimal()
        };
        return authoring::run_dupes(&cfg, path, *threshold).await;
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Reindex {
            paths,
            dry_run,
            progress,
        } => {
            ingest::run_reindex(&cfg, &paths, dry_run, progress.mode()).await?;
        }
        Commands::Search {
            term,
            filters,
            json,
        } => {
            search::run_search(&cfg, &term, &filters.into(), json).await?;
        }
        Commands::List { filters, json } => {
            search::run_list(&cfg, &filters.into(), json).await?;
        }
        Commands::Get {
            slug,
            id,
            knowledgebase,
            json,
        } => {
            let lookup = match (id, slug) {
                (Some(id), _) => Lookup::CanonicalId(id),
                (None, Some(slug)) => Lookup::Slug {
                    slug,
                    knowledgebase,
                },
                (None, None) => anyhow::bail!("Pass a slug or --id"),
            };
            get::run_get(&cfg, &lookup, json).await?;
        }
        Commands::Resolve {
            reference,
            knowledgebase,
            json,
        } => {
            get::run_resolve(&cfg, &reference, knowledgebase.as_deref(), json).await?;
        }
        Commands::Roadmap {
            knowledgebase,
            topic,
            output,
        } => {
            roadmap::run_roadmap(&cfg, &knowledgebase, topic.as_deref(), output.as_deref())
                .await?;
        }
        Commands::Check {
            file,
            knowledgebase,
            json,
        } => {
            authoring::run_check(&cfg, &file, knowledgebase.as_deref(), json).await?;
        }
        Commands::Admit {
            file,
            knowledgebase,
        } => {
            authoring::run_admit(&cfg, &file, knowledgebase.as_deref()).await?;
        }
        Commands::Dupes { .. } => {
            // Handled above (before config loading)
        }
        Commands::Links { path, strict } => {
            links::run_links(&cfg, &path, strict).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Topics { knowledgebase } => {
            stats::run_topics(&cfg, &knowledgebase).await?;
        }
        Commands::Projects { action } => match action {
            ProjectAction::Index { path } => {
                projects::run_index(&cfg, path).await?;
            }
            ProjectAction::List { topic, level } => {
                projects::run_list(&cfg, topic.as_deref(), level).await?;
            }
            ProjectAction::Show { slug, topic, json } => {
                projects::run_show(&cfg, &slug, topic.as_deref(), json).await?;
            }
            ProjectAction::Topics => {
                projects::run_topics(&cfg).await?;
            }
        },
    }

    Ok(())
}
