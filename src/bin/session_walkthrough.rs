//! # Session Walkthrough
//!
//! Runs one process instance through its whole life against a real database:
//! start and suspend, dispose, find the suspension point by business key,
//! reload, complete transactionally, and print the business entity index.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use process_sessions::config::ConfigManager;
use process_sessions::definitions::{DefinitionResource, KnowledgeBaseTable, Record, ResourceType, Variables};
use process_sessions::logging::init_structured_logging;
use process_sessions::models::BusinessEntity;
use process_sessions::orchestration::{CompletionCoordinator, SessionLifecycleManager};
use process_sessions::session::Environment;
use process_sessions::work_items::IndexingTaskHandler;
use process_sessions::StatefulSession;

const PROCESS_ID: &str = "com.salaboy.process.AsyncInteractions";
const FALLBACK_BUSINESS_KEY: &str = "salaboy";

#[derive(Parser)]
#[command(name = "session-walkthrough")]
#[command(about = "Suspend, reload and resume a persistent process session")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment section to apply (default: detected from PROCESS_SESSIONS_ENV / APP_ENV)
    #[arg(short, long)]
    environment: Option<String>,

    /// Override the configured database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Directory holding the process definitions
    #[arg(long, default_value = "resources")]
    resources: PathBuf,

    /// Business key the suspension points are recorded under
    /// (default: sessions.default_business_key, then "salaboy")
    #[arg(short, long)]
    business_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
        .context("loading configuration")?;

    let mut database = manager.config().database.clone();
    if let Some(url) = &cli.database_url {
        database.url = url.clone();
    }
    let sessions = manager.config().sessions.clone();
    let task_types = sessions.handler_task_types.clone();
    let handler = IndexingTaskHandler::from_config(&sessions, cli.business_key.clone());
    let handler = Arc::new(match handler.business_key() {
        Some(_) => handler,
        None => IndexingTaskHandler::with_key(FALLBACK_BUSINESS_KEY),
    });
    let business_key = handler.business_key().unwrap_or(FALLBACK_BUSINESS_KEY).to_string();

    let env = Environment::connect(&database)
        .await
        .with_context(|| format!("connecting to {}", database.url))?;
    let lifecycle = SessionLifecycleManager::new(env.clone());
    let coordinator = CompletionCoordinator::new(env.clone());
    let mut kbases = KnowledgeBaseTable::new();

    let resources = vec![DefinitionResource::from_path(
        cli.resources.join("process-async-interactions.yaml"),
        ResourceType::Process,
    )];

    // 1. Start and suspend at the first task
    let mut session = lifecycle
        .create_session(&mut kbases, &business_key, resources)
        .await
        .context("creating session")?;
    register_handlers(&mut session, &task_types, &handler)?;

    let mut variables = Variables::new();
    variables.insert(
        "person".to_string(),
        Record::new("Person").with("name", "Salaboy").with("age", 29).into(),
    );
    let instance_id = session.start_process(PROCESS_ID, variables).await?;
    info!(session_id = session.id(), instance_id, "Process instance suspended");
    lifecycle.dispose(&mut session)?;

    // 2. Resume through the index until the instance completes
    let index = env.index();
    let mut round = 1;
    while let Some(entity) = find_suspension_point(&index, &business_key).await? {
        let mut session = lifecycle
            .load_session_by_key(&kbases, &business_key, entity.session_id)
            .await
            .with_context(|| format!("reloading session {}", entity.session_id))?;
        register_handlers(&mut session, &task_types, &handler)?;

        let outcome = coordinator.complete(session, &entity, None).await?;
        println!(
            "round {round}: completed work item {} (transaction {}), created {:?}, process completed: {}",
            outcome.work_item_id,
            outcome.transaction_id,
            outcome.created_work_items,
            outcome.process_completed
        );
        round += 1;
    }

    // 3. Show what the index recorded
    println!("\nbusiness entities:");
    for entity in index
        .find_all_active()
        .await?
        .into_iter()
        .chain(index.find_all_inactive().await?)
    {
        println!(
            "  #{:<3} key={:<12} session={:<3} process={:<3} work_item={:<3} active={}",
            entity.id,
            entity.business_key.as_deref().unwrap_or("-"),
            entity.session_id,
            entity.process_id,
            entity.work_item_id,
            entity.active
        );
    }

    Ok(())
}

fn register_handlers(
    session: &mut StatefulSession,
    task_types: &[String],
    handler: &Arc<IndexingTaskHandler>,
) -> Result<()> {
    session
        .register_handler_for(task_types.iter().cloned(), handler.clone())
        .context("registering work item handlers")?;
    Ok(())
}

async fn find_suspension_point(
    index: &process_sessions::BusinessEntityIndex,
    business_key: &str,
) -> Result<Option<BusinessEntity>> {
    match index.find_active_by_key(business_key).await {
        Ok(entity) => Ok(Some(entity)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
