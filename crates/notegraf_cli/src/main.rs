//! `notegraf` command-line entry point.
//!
//! # Responsibility
//! - Select a Note Store backend (SQLite file or HTTP server).
//! - Expose sequence browsing, revision browsing and note writes as subcommands.
//! - Bring up file logging before any store access.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use notegraf_core::model::note::{NoteDraft, NoteId, RevisionId};
use notegraf_core::service::revisions::RevisionSelector;
use notegraf_core::service::sequence::SequenceAssembler;
use notegraf_core::service::note_service::parse_tag_list;
use notegraf_core::service::{BrowseConfig, LoadStatus, NoteService};
use notegraf_core::store::{HttpNoteStore, HttpStoreConfig, NoteWriter, SqliteNoteStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "notegraf", version, about = "Browse linked note sequences and revisions")]
struct Cli {
    /// SQLite database file to use as the note store; wins over `--server`.
    #[arg(long, global = true, env = "NOTEGRAF_DB")]
    db: Option<PathBuf>,

    /// Base URL of a Notegraf server; defaults to `NOTEGRAF_BASE_URL`.
    #[arg(long, global = true)]
    server: Option<String>,

    #[arg(long, global = true, env = "NOTEGRAF_LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory for rolling log files; logging stays off when unset.
    #[arg(long, global = true, env = "NOTEGRAF_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(flatten)]
    Notes(NoteCommand),
    /// Print the core library version.
    Version,
}

/// Commands that need a note store.
#[derive(Debug, Subcommand)]
enum NoteCommand {
    /// Print the chain of notes around an anchor.
    Sequence {
        anchor: String,
        /// Follow prev/next links until the chain ends.
        #[arg(long)]
        recursive: bool,
    },
    /// List the revisions of a note and show the active one.
    Revisions {
        anchor: String,
        #[arg(long)]
        select: Option<String>,
    },
    /// Create a note.
    Create(NoteArgs),
    /// Write a new revision of a note; unset fields keep their current value.
    Update {
        id: String,
        #[command(flatten)]
        note: NoteArgs,
    },
    Delete { id: String },
    /// Make `next` follow `prev`.
    Link { prev: String, next: String },
}

#[derive(Debug, Args)]
struct NoteArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    body: Option<String>,
    #[arg(long)]
    prev: Option<String>,
    #[arg(long)]
    next: Option<String>,
    /// Comma-separated tag list.
    #[arg(long)]
    tags: Option<String>,
}

#[derive(Debug)]
enum Backend {
    Sqlite(PathBuf),
    Http(HttpStoreConfig),
}

impl Cli {
    /// `--db` selects SQLite; otherwise HTTP, with `--server` overriding the
    /// environment's base URL.
    fn backend(&self, env_config: HttpStoreConfig) -> Backend {
        if let Some(path) = &self.db {
            return Backend::Sqlite(path.clone());
        }
        let mut config = env_config;
        if let Some(server) = &self.server {
            config.base_url = server.clone();
        }
        Backend::Http(config)
    }
}

impl NoteArgs {
    fn apply(self, mut draft: NoteDraft) -> NoteDraft {
        if let Some(title) = self.title {
            draft.title = Some(title);
        }
        if let Some(body) = self.body {
            draft.body = body;
        }
        if let Some(prev) = self.prev {
            draft.prev = Some(NoteId::new(prev));
        }
        if let Some(next) = self.next {
            draft.next = Some(NoteId::new(next));
        }
        if let Some(tags) = self.tags {
            draft.tags = parse_tag_list(&tags);
        }
        draft
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli
            .log_level
            .as_deref()
            .unwrap_or(notegraf_core::default_log_level());
        notegraf_core::init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    let backend = cli.backend(HttpStoreConfig::from_env());
    let command = match cli.command {
        Command::Version => {
            println!("notegraf {}", notegraf_core::core_version());
            return Ok(());
        }
        Command::Notes(command) => command,
    };

    match backend {
        Backend::Sqlite(path) => {
            let store = SqliteNoteStore::open(&path)
                .with_context(|| format!("failed to open database `{}`", path.display()))?;
            info!("event=cli_start module=cli status=ok backend=sqlite");
            run(Arc::new(store), command).await
        }
        Backend::Http(config) => {
            let store = HttpNoteStore::new(config).context("failed to build http store")?;
            info!("event=cli_start module=cli status=ok backend=http");
            run(Arc::new(store), command).await
        }
    }
}

async fn run<S: NoteWriter + 'static>(store: Arc<S>, command: NoteCommand) -> Result<()> {
    match command {
        NoteCommand::Sequence { anchor, recursive } => {
            let config = BrowseConfig {
                recursive_default: recursive,
            };
            let assembler = SequenceAssembler::new(store, NoteId::new(anchor), &config);
            assembler.mount().await;
            let state = assembler.state();
            if let LoadStatus::Failed(err) = &state.status {
                bail!("{err}");
            }
            for (index, note) in state.notes.iter().enumerate() {
                let marker = if note.id == state.anchor { "*" } else { " " };
                println!(
                    "{marker} {:>3}  {}  {}",
                    index + 1,
                    note.id,
                    note.display_title().unwrap_or("(untitled)")
                );
            }
            for stop in &state.cycle_stops {
                println!("note: {}", stop.to_error());
            }
        }
        NoteCommand::Revisions { anchor, select } => {
            let selector = RevisionSelector::new(store, NoteId::new(anchor));
            selector.load().await;
            if let LoadStatus::Failed(err) = &selector.state().status {
                bail!("{err}");
            }
            if let Some(revision) = select {
                let revision = RevisionId::new(revision);
                let already = selector.state().selected.as_ref() == Some(&revision);
                if !already && !selector.select(&revision) {
                    bail!("revision `{revision}` is not part of this note's history");
                }
            }
            for summary in selector.summaries() {
                let marker = if summary.is_selected { "*" } else { " " };
                let label = summary
                    .title
                    .or(summary.preview)
                    .unwrap_or_else(|| "(empty)".to_string());
                println!(
                    "{marker} {}  {}  {}",
                    summary.revision,
                    summary.modified_at.format("%Y-%m-%d %H:%M:%S"),
                    label
                );
            }
            if let Some(active) = selector.active() {
                println!();
                println!("{}", active.body);
            }
        }
        NoteCommand::Create(args) => {
            let service = NoteService::new(store);
            let note = service.create_note(args.apply(NoteDraft::default())).await?;
            println!("{} {}", note.id, note.revision);
        }
        NoteCommand::Update { id, note } => {
            let id = NoteId::new(id);
            let current = store.fetch_note(&id).await?;
            let service = NoteService::new(store);
            let note = service
                .update_note(&id, note.apply(NoteDraft::from_note(&current)))
                .await?;
            println!("{} {}", note.id, note.revision);
        }
        NoteCommand::Delete { id } => {
            NoteService::new(store).delete_note(&NoteId::new(id)).await?;
        }
        NoteCommand::Link { prev, next } => {
            let pair = NoteService::new(store)
                .link_notes(&NoteId::new(prev), &NoteId::new(next))
                .await?;
            println!("{} -> {}", pair.prev.id, pair.next.id);
        }
    }
    Ok(())
}
