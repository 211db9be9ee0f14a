//! Process entrypoint. Wires config, logging, and every service crate
//! together behind a small set of subcommands: submit a journal entry,
//! resume in-flight workflows as a daemon, inspect a workflow's stage,
//! and list/decide pending curation items.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use minerva_config::AppConfig;
use minerva_curation::CurationStore;
use minerva_domain::{CurationPhase, JournalEntry};
use minerva_graph::{GraphStore, Neo4jGraphStore};
use minerva_llm::{LlmGateway, OllamaProvider};
use minerva_orchestrator::{Orchestrator, PipelineEngine, WorkflowScheduler};
use minerva_vault::VaultIndex;

#[derive(Debug, Parser)]
#[command(name = "minerva", version, about = "Journal-entry knowledge extraction pipeline")]
struct Cli {
    #[arg(long, default_value = "minerva.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Submit a journal entry's raw text file and drive its workflow in
    /// the foreground until it blocks on curation or reaches a terminal
    /// stage.
    Submit {
        /// Path to a UTF-8 text file containing the day's narration.
        path: PathBuf,
        /// The journal's calendar date, e.g. 2026-07-28. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Resume every in-flight workflow found in the curation store and
    /// run until Ctrl-C.
    Serve,
    /// Report a workflow's current stage.
    Status { workflow_id: Uuid },
    /// List curation items awaiting a decision.
    CurationList {
        journal_uuid: Uuid,
        #[arg(long, value_enum)]
        phase: CliPhase,
    },
    /// Approve, reject, or edit a pending curation item.
    CurationDecide {
        item_id: Uuid,
        #[command(subcommand)]
        action: CurationAction,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPhase {
    Entity,
    Relation,
}

impl From<CliPhase> for CurationPhase {
    fn from(phase: CliPhase) -> Self {
        match phase {
            CliPhase::Entity => CurationPhase::Entity,
            CliPhase::Relation => CurationPhase::Relation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum CurationAction {
    Approve,
    Reject,
    /// Replace the payload with `json` (must parse as a JSON object).
    Edit { json: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config).context("loading configuration")?;

    match cli.command {
        Commands::Submit { path, date } => submit(&config, path, date).await,
        Commands::Serve => serve(&config).await,
        Commands::Status { workflow_id } => status(&config, workflow_id),
        Commands::CurationList { journal_uuid, phase } => curation_list(&config, journal_uuid, phase.into()),
        Commands::CurationDecide { item_id, action } => curation_decide(&config, item_id, action),
    }
}

fn open_curation(config: &AppConfig) -> Result<Arc<CurationStore>> {
    Ok(Arc::new(CurationStore::open(&config.curation.db_path).context("opening curation store")?))
}

async fn build_engine(config: &AppConfig) -> Result<(Arc<PipelineEngine>, Arc<CurationStore>)> {
    let curation = open_curation(config)?;
    let graph = Neo4jGraphStore::connect(&config.graph.uri, &config.graph.user, &config.graph.password)
        .await
        .context("connecting to graph store")?;
    let llm = Arc::new(LlmGateway::with_concurrency(
        Arc::new(OllamaProvider::new(config.llm.base_url.clone())),
        config.llm.max_concurrent_requests,
    ));
    let vault_root = PathBuf::from(&config.vault.path);
    let vault_index = Arc::new(VaultIndex::build(&vault_root).context("indexing vault")?);
    let engine = Arc::new(PipelineEngine::new(
        curation.clone(),
        Arc::new(graph) as Arc<dyn GraphStore>,
        llm,
        vault_root,
        vault_index,
        config.llm.model.clone(),
        config.orchestrator.curation_deadline_days,
    ));
    Ok((engine, curation))
}

async fn submit(config: &AppConfig, path: PathBuf, date: Option<NaiveDate>) -> Result<()> {
    let raw_text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
    let journal = JournalEntry::from_text(date, raw_text);
    journal.validate().map_err(|e| anyhow::anyhow!(e))?;
    let workflow_id = journal.uuid;

    let (engine, curation) = build_engine(config).await?;
    let poll_interval = std::time::Duration::from_secs(config.orchestrator.poll_interval_secs);
    let heartbeat_interval = std::time::Duration::from_secs(config.orchestrator.heartbeat_interval_secs);
    let scheduler = Arc::new(WorkflowScheduler::new(engine, poll_interval, heartbeat_interval));
    let orchestrator = Orchestrator::new(scheduler, curation);

    orchestrator.submit(journal).await.context("submitting journal")?;
    println!("submitted workflow {workflow_id}");

    loop {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let Some(stage) = orchestrator.status(workflow_id)? else { continue };
        println!("stage: {stage:?}");
        if stage.is_terminal() || stage.is_wait_state() {
            break;
        }
    }
    orchestrator.shutdown().await;
    Ok(())
}

async fn serve(config: &AppConfig) -> Result<()> {
    let (engine, curation) = build_engine(config).await?;
    let poll_interval = std::time::Duration::from_secs(config.orchestrator.poll_interval_secs);
    let heartbeat_interval = std::time::Duration::from_secs(config.orchestrator.heartbeat_interval_secs);
    let scheduler = Arc::new(WorkflowScheduler::new(engine, poll_interval, heartbeat_interval));
    let orchestrator = Orchestrator::new(scheduler, curation);

    let resumed = orchestrator.resume_all().await.context("resuming in-flight workflows")?;
    tracing::info!(resumed, "orchestrator started");

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    orchestrator.shutdown().await;
    Ok(())
}

fn status(config: &AppConfig, workflow_id: Uuid) -> Result<()> {
    let curation = open_curation(config)?;
    match curation.load_workflow_state(workflow_id)? {
        Some(state) => {
            println!("stage: {:?}", state.stage);
            println!("entity curation: {}/{} pending", state.entity_curation_pending, state.entity_curation_items);
            println!("relation curation: {}/{} pending", state.relation_curation_pending, state.relation_curation_items);
            if let Some(err) = state.last_error {
                println!("last error: {err}");
            }
        }
        None => println!("no workflow found with id {workflow_id}"),
    }
    Ok(())
}

fn curation_list(config: &AppConfig, journal_uuid: Uuid, phase: CurationPhase) -> Result<()> {
    let curation = open_curation(config)?;
    for item in curation.items_for_phase(journal_uuid, phase)? {
        println!("{} [{:?}/{:?}] {}", item.id, item.kind, item.status, item.effective_payload());
    }
    Ok(())
}

fn curation_decide(config: &AppConfig, item_id: Uuid, action: CurationAction) -> Result<()> {
    let curation = open_curation(config)?;
    let item = match action {
        CurationAction::Approve => curation.decide(item_id, |i| i.approve())?,
        CurationAction::Reject => curation.decide(item_id, |i| i.reject())?,
        CurationAction::Edit { json } => {
            let value: serde_json::Value = serde_json::from_str(&json).context("parsing edited payload as JSON")?;
            if !value.is_object() {
                bail!("edited payload must be a JSON object");
            }
            curation.decide(item_id, |i| i.edit(value))?
        }
    };
    println!("{} is now {:?}", item.id, item.status);
    Ok(())
}
