pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::core::agent::AgentOrchestrator;
use crate::core::breaker::ServiceBreakers;
use crate::core::embedding::EmbeddingWorker;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::Store;

pub struct ApiServer {
    state: AppState,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<Store>,
    pub(crate) orchestrator: Arc<AgentOrchestrator>,
    pub(crate) worker: Arc<EmbeddingWorker>,
    pub(crate) breakers: Arc<ServiceBreakers>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
}

impl ApiServer {
    pub fn new(
        store: Arc<Store>,
        orchestrator: Arc<AgentOrchestrator>,
        worker: Arc<EmbeddingWorker>,
        breakers: Arc<ServiceBreakers>,
        api_host: String,
        api_port: u16,
    ) -> Self {
        Self {
            state: AppState {
                store,
                orchestrator,
                worker,
                breakers,
                api_host,
                api_port,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::agent::AgentOrchestrator;
    use crate::core::llm::{ChatMessage, LlmManager, LlmProvider, ProviderType};
    use crate::core::store::test_store;
    use crate::core::tools::ToolRegistry;
    use crate::core::tools::test_support::{RecordingMailer, TestEmbedder};
    use std::time::Duration;
    use tokio::sync::RwLock;

    /// Always answers with a valid response envelope.
    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn provider_type(&self) -> ProviderType {
            ProviderType::OpenAI
        }

        async fn generate(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String> {
            Ok(serde_json::json!({
                "thought": "t", "type": "response", "response": "ack"
            })
            .to_string())
        }
    }

    pub async fn test_state(api_host: &str, with_token: bool) -> (AppState, Option<String>) {
        let store = Arc::new(test_store().await);
        let token = if with_token {
            let (raw, _) = store
                .create_api_token("user-1", "test-token")
                .await
                .expect("api token should be created");
            Some(raw)
        } else {
            None
        };

        let breakers = Arc::new(ServiceBreakers::new(3, Duration::from_secs(30)));
        let embedder = Arc::new(TestEmbedder);
        let registry = Arc::new(ToolRegistry::new(
            store.clone(),
            embedder.clone(),
            Arc::new(RecordingMailer::default()),
            breakers.clone(),
            None,
        ));
        let mut manager = LlmManager::new();
        manager.register_provider(Box::new(EchoProvider));
        manager.set_active(ProviderType::OpenAI, "echo".to_string());
        let orchestrator = Arc::new(AgentOrchestrator::new(
            Arc::new(RwLock::new(manager)),
            registry,
            8,
        ));
        let worker = Arc::new(EmbeddingWorker::new(store.clone(), embedder, 16));

        (
            AppState {
                store,
                orchestrator,
                worker,
                breakers,
                api_host: api_host.to_string(),
                api_port: 17890,
            },
            token,
        )
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            let addr = format!("{}:{}", state.api_host, state.api_port);
            let app = router::build_api_router(state);

            if let Ok(listener) = tokio::net::TcpListener::bind(&addr).await {
                info!("API Server running at http://{addr}");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("API Server crashed: {}", e);
                }
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        Ok(())
    }
}
