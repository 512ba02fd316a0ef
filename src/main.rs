mod config;
mod core;
mod interfaces;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::config::Config;
use crate::core::agent::AgentOrchestrator;
use crate::core::breaker::ServiceBreakers;
use crate::core::embedding::EmbeddingWorker;
use crate::core::lifecycle::LifecycleManager;
use crate::core::llm::providers::{OpenAiEmbedder, OpenAiProvider};
use crate::core::llm::{LlmManager, ProviderType};
use crate::core::mailer::{HttpMailer, Mailer};
use crate::core::store::Store;
use crate::core::tools::{ToolRegistry, WebSearchConfig};
use crate::interfaces::web::ApiServer;

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(e) = run().await {
        error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let workspace_dir = std::env::var("DOCSMITH_WORKSPACE").unwrap_or_else(|_| "data".to_string());
    let config = Config::load(&workspace_dir).await?;

    let openai_key =
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set in the environment")?;

    let store = Arc::new(Store::new(&workspace_dir).await?);
    let breakers = Arc::new(ServiceBreakers::new(
        config.breaker.failure_threshold,
        Duration::from_secs(config.breaker.cooldown_secs),
    ));

    let mut llm = LlmManager::new();
    llm.register_provider(Box::new(OpenAiProvider::new(openai_key.clone())));
    llm.set_active(ProviderType::OpenAI, config.llm.chat_model.clone());
    let llm = Arc::new(RwLock::new(llm));

    let embedder = Arc::new(OpenAiEmbedder::new(
        openai_key,
        config.llm.embedding_model.clone(),
    ));

    let mailer: Arc<dyn Mailer> = match (&config.email.endpoint, &config.email.sender) {
        (Some(endpoint), Some(sender)) => {
            let key = std::env::var("EMAIL_API_KEY")
                .context("EMAIL_API_KEY must be set when [email] is configured")?;
            Arc::new(HttpMailer::new(endpoint.clone(), key, sender.clone()))
        }
        _ => {
            info!("No [email] config, outgoing mail disabled");
            Arc::new(DisabledMailer)
        }
    };

    let web_search = config.web_search.endpoint.as_ref().and_then(|endpoint| {
        let api_key = std::env::var("WEB_SEARCH_API_KEY").ok()?;
        Some(WebSearchConfig {
            endpoint: endpoint.clone(),
            api_key,
        })
    });

    let tools = Arc::new(ToolRegistry::new(
        store.clone(),
        embedder.clone(),
        mailer,
        breakers.clone(),
        web_search,
    ));
    let orchestrator = Arc::new(AgentOrchestrator::new(
        llm,
        tools,
        config.agent.max_turns,
    ));
    let worker = Arc::new(EmbeddingWorker::new(
        store.clone(),
        embedder,
        config.worker.batch_size,
    ));

    let mut lifecycle = LifecycleManager::new().await?;
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        store,
        orchestrator,
        worker.clone(),
        breakers,
        config.server.host.clone(),
        config.server.port,
    ))));

    // Background worker tick. Overlap with the on-demand endpoint is fine;
    // the claim in the store keeps jobs exclusive.
    let worker_for_cron = worker.clone();
    let tick = tokio_cron_scheduler::Job::new_async(
        config.worker.cron.as_str(),
        move |_uuid, mut _l| {
            let worker = worker_for_cron.clone();
            Box::pin(async move {
                if let Err(e) = worker.process_batch().await {
                    error!("embedding worker tick failed: {}", e);
                }
            })
        },
    )?;
    lifecycle.scheduler.add(tick).await?;

    lifecycle.start().await?;
    info!("docsmith ready");

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    Ok(())
}

/// Stands in when no email provider is configured; every send fails with a
/// clear reason, which tools surface as a failed observation.
struct DisabledMailer;

#[async_trait::async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _email: &crate::core::mailer::OutgoingEmail) -> Result<()> {
        anyhow::bail!("outgoing email is not configured")
    }
}
