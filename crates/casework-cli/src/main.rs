//! `casework` runs the triage engine over a JSON snapshot.
//!
//! # Usage
//!
//! ```
//! casework --snapshot pool.json preview <MESSAGE_ID>
//! casework --snapshot pool.json commit <MESSAGE_ID> --case <CASE_ID> \
//!   --with-siblings --out pool.json
//! ```
//!
//! Results are printed to stdout as JSON. Logs go to stderr and honour
//! `RUST_LOG`. Engine thresholds come from `casework.toml` (or `--config`)
//! and `CASEWORK_*` environment variables, e.g.
//! `CASEWORK_SUGGESTER__MIN_CONFIDENCE=0.6`.

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use casework_core::{
  snapshot::{MemoryStore, Snapshot},
  tag::EntityRef,
};
use casework_triage::{
  BulkCommit, CancelToken, Decision, TriageConfig, TriageContext,
  TriageEngine, fingerprint, tags,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Casework triage engine")]
struct Cli {
  /// JSON snapshot of messages, constituents, cases and tags.
  #[arg(short, long, value_name = "FILE", env = "CASEWORK_SNAPSHOT")]
  snapshot: PathBuf,

  /// TOML file with engine thresholds. Missing is fine.
  #[arg(short, long, value_name = "FILE", default_value = "casework.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Messages that belong in the same campaign as MESSAGE_ID.
  Siblings {
    message_id: Uuid,
    /// Leave out messages already assigned to this campaign.
    #[arg(long)]
    campaign:   Option<Uuid>,
  },

  /// Unassigned messages grouped by shared subject.
  Campaigns,

  /// Resolve the sender of MESSAGE_ID to a constituent.
  Resolve { message_id: Uuid },

  /// Suggest a case to link MESSAGE_ID to.
  Suggest {
    message_id:  Uuid,
    /// Only consider this constituent's cases.
    #[arg(long)]
    constituent: Option<Uuid>,
  },

  /// Everything the triage screen shows for MESSAGE_ID.
  Preview { message_id: Uuid },

  /// Diff a tag selection against the persisted set.
  Reconcile {
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    selected: Vec<Uuid>,
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    original: Vec<Uuid>,
  },

  /// Apply a decision to MESSAGE_ID (and optionally its siblings).
  Commit {
    message_id:    Uuid,
    /// Assign to an existing campaign.
    #[arg(long, conflicts_with = "new_campaign")]
    campaign:      Option<Uuid>,
    /// Create a campaign with this name from the message, then assign.
    #[arg(long, value_name = "NAME")]
    new_campaign:  Option<String>,
    /// Link to a case.
    #[arg(long = "case")]
    case_id:       Option<Uuid>,
    /// Replace the message's tags with exactly these (empty clears them).
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    tags:          Option<Vec<Uuid>>,
    /// Apply to every sibling as well.
    #[arg(long)]
    with_siblings: bool,
    /// Write the updated snapshot here.
    #[arg(long, value_name = "FILE")]
    out:           Option<PathBuf>,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let config = load_config(&cli.config)?;
  let engine = TriageEngine::new(config).context("invalid engine config")?;
  let snapshot = load_snapshot(&cli.snapshot)?;

  run(&engine, snapshot, cli.command).await
}

async fn run(
  engine: &TriageEngine,
  snapshot: Snapshot,
  command: Command,
) -> anyhow::Result<()> {
  let now = Utc::now();

  match command {
    Command::Siblings { message_id, campaign } => {
      let ctx = TriageContext::from(snapshot);
      let message = ctx.message(message_id)?;
      let siblings =
        fingerprint::find_siblings(message, &ctx.messages, campaign);
      emit(&siblings)
    }
    Command::Campaigns => {
      let groups = fingerprint::group_campaign_candidates(&snapshot.messages);
      emit(&groups)
    }
    Command::Resolve { message_id } => {
      let ctx = TriageContext::from(snapshot);
      let (extracted, resolved) = engine.resolve(&ctx, message_id)?;
      emit(&json!({ "extracted": extracted, "match": resolved }))
    }
    Command::Suggest { message_id, constituent } => {
      let ctx = TriageContext::from(snapshot);
      let suggestion = engine.suggest(&ctx, message_id, constituent, now)?;
      emit(&json!({
        "default_action": suggestion.default_action(),
        "suggestion": suggestion,
      }))
    }
    Command::Preview { message_id } => {
      let ctx = TriageContext::from(snapshot);
      emit(&engine.preview(&ctx, message_id, now)?)
    }
    Command::Reconcile { selected, original } => {
      let selected: BTreeSet<Uuid> = selected.into_iter().collect();
      let original: BTreeSet<Uuid> = original.into_iter().collect();
      let diff = tags::reconcile(&selected, &original);
      emit(&json!({
        "states": diff,
        "display": diff.display_set(),
        "commit": diff.commit_set(),
        "dirty": diff.is_dirty(),
      }))
    }
    Command::Commit {
      message_id,
      campaign,
      new_campaign,
      case_id,
      tags,
      with_siblings,
      out,
    } => {
      let decision = Decision {
        campaign_id: campaign,
        case_id,
        tags: tags.map(|t| t.into_iter().collect()),
      };
      commit(
        engine,
        snapshot,
        message_id,
        decision,
        new_campaign,
        with_siblings,
        out,
      )
      .await
    }
  }
}

async fn commit(
  engine: &TriageEngine,
  snapshot: Snapshot,
  message_id: Uuid,
  decision: Decision,
  new_campaign: Option<String>,
  with_siblings: bool,
  out: Option<PathBuf>,
) -> anyhow::Result<()> {
  if decision.mutations().is_empty() && new_campaign.is_none() {
    bail!("nothing to commit: pass --campaign, --new-campaign, --case or --tags")
  }

  let ctx = TriageContext::from(snapshot.clone());
  let targets = if with_siblings {
    engine.preview(&ctx, message_id, Utc::now())?.targets()
  } else {
    vec![ctx.message(message_id)?.message_id]
  };
  let before = ctx.tags_of(EntityRef::Message(message_id));

  let store = Arc::new(MemoryStore::new(snapshot));
  let cancel = CancelToken::new();
  let bulk = BulkCommit::new().with_cancel(cancel.clone());
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupted; remaining messages will be skipped");
      cancel.cancel();
    }
  });

  let mut report = serde_json::Map::new();
  report.insert("targets".into(), serde_json::to_value(&targets)?);

  if let Some(name) = new_campaign {
    let (campaign, outcome) = engine
      .create_campaign(&store, &ctx, message_id, &name, &targets, &bulk)
      .await?;
    report.insert("campaign".into(), serde_json::to_value(&campaign)?);
    report.insert(
      "campaign_outcome".into(),
      serde_json::to_value(outcome.reported())?,
    );
  }
  if !decision.mutations().is_empty() {
    if let Some(selected) = &decision.tags {
      let diff = tags::reconcile(selected, &before);
      report.insert("tags".into(), serde_json::to_value(&diff)?);
    }
    let outcome = engine.commit(&store, &targets, &decision, &bulk).await?;
    report.insert("outcome".into(), serde_json::to_value(outcome.reported())?);
  }

  if let Some(path) = out {
    let json = store.snapshot().to_json_pretty()?;
    std::fs::write(&path, json)
      .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
    tracing::info!("wrote snapshot to {}", path.display());
  }

  emit(&report)
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> anyhow::Result<TriageConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("CASEWORK")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise TriageConfig")
}

fn load_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading snapshot {}", path.display()))?;
  Snapshot::from_json(&raw)
    .with_context(|| format!("parsing snapshot {}", path.display()))
}

fn emit(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
