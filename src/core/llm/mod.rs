pub mod providers;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderType {
    OpenAI,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A chat-completion backend. The orchestrator only sees this trait, which
/// is what lets tests drive it with a scripted provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Execute a structured conversation against a selected model.
    async fn generate(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String>;
}

pub struct LlmManager {
    providers: Vec<Box<dyn LlmProvider>>,
    selected_provider: Option<ProviderType>,
    selected_model: Option<String>,
}

impl LlmManager {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            selected_provider: None,
            selected_model: None,
        }
    }

    pub fn register_provider(&mut self, provider: Box<dyn LlmProvider>) {
        info!("Registered LLM Provider: {:?}", provider.provider_type());
        self.providers.push(provider);
    }

    pub fn set_active(&mut self, provider: ProviderType, model_id: String) {
        info!("Setting active LLM: {:?} ({})", provider, model_id);
        self.selected_provider = Some(provider);
        self.selected_model = Some(model_id);
    }

    pub fn get_provider(&self, pt: ProviderType) -> Option<&dyn LlmProvider> {
        self.providers
            .iter()
            .find(|p| p.provider_type() == pt)
            .map(|p| p.as_ref())
    }

    pub async fn generate_with_selected(&self, messages: &[ChatMessage]) -> Result<String> {
        let provider_type = self
            .selected_provider
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No LLM provider selected"))?;

        let model_id = self
            .selected_model
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No LLM model selected"))?;

        let provider = self
            .get_provider(provider_type.clone())
            .ok_or_else(|| anyhow::anyhow!("Selected provider not found in registry"))?;

        provider.generate(model_id, messages).await
    }
}
