mod create_document;
mod fetch_content;
mod send_email;
mod web_search;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::core::breaker::ServiceBreakers;
use crate::core::embedding::Embedder;
use crate::core::mailer::Mailer;
use crate::core::store::Store;

/// The closed set of tools the agent may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolId {
    FetchContent,
    CreateDocument,
    WebSearch,
    SendEmail,
}

impl ToolId {
    pub const ALL: [ToolId; 4] = [
        ToolId::FetchContent,
        ToolId::CreateDocument,
        ToolId::WebSearch,
        ToolId::SendEmail,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "fetch_content" => Some(ToolId::FetchContent),
            "create_document" => Some(ToolId::CreateDocument),
            "web_search" => Some(ToolId::WebSearch),
            "send_email" => Some(ToolId::SendEmail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::FetchContent => "fetch_content",
            ToolId::CreateDocument => "create_document",
            ToolId::WebSearch => "web_search",
            ToolId::SendEmail => "send_email",
        }
    }

    /// One-line usage description rendered into the system prompt.
    pub fn describe(&self) -> &'static str {
        match self {
            ToolId::FetchContent => {
                "fetch_content(search_type: \"semantic\"|\"grep\", query, target_id?, max_results?): search the caller's indexed documents and return matching pages"
            }
            ToolId::CreateDocument => {
                "create_document(title, content, source_ids?): save content as a new document artifact and return its id"
            }
            ToolId::WebSearch => {
                "web_search(query, max_tokens?): search the web and return a text digest"
            }
            ToolId::SendEmail => {
                "send_email(recipient_name, recipient_email, subject, body, attachment_id?): send an email, optionally attaching a previously created document"
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// What a tool run feeds back into the conversation. Error observations keep
/// the session alive; the agent never aborts on one.
#[derive(Debug, Clone)]
pub struct Observation {
    pub payload: Value,
    pub is_error: bool,
}

impl Observation {
    pub fn success(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    pub fn error(payload: Value) -> Self {
        Self {
            payload,
            is_error: true,
        }
    }
}

// Parameter extraction helpers shared by the tool handlers.

pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing required parameter '{key}'")))
}

pub(crate) fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub(crate) fn optional_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

pub(crate) fn optional_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

/// Endpoint and key for the external web search provider. Absent when the
/// deployment has no provider configured.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub endpoint: String,
    pub api_key: String,
}

/// Shared context the tool handlers run against.
pub struct ToolRegistry {
    pub(crate) store: Arc<Store>,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) mailer: Arc<dyn Mailer>,
    pub(crate) breakers: Arc<ServiceBreakers>,
    pub(crate) http: reqwest::Client,
    pub(crate) web_search: Option<WebSearchConfig>,
}

impl ToolRegistry {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        mailer: Arc<dyn Mailer>,
        breakers: Arc<ServiceBreakers>,
        web_search: Option<WebSearchConfig>,
    ) -> Self {
        Self {
            store,
            embedder,
            mailer,
            breakers,
            http: reqwest::Client::new(),
            web_search,
        }
    }

    /// Run one tool to completion for the given caller. Validation problems
    /// surface as `InvalidParameters`; handlers may instead return an error
    /// observation when the failure should read as a tool result.
    pub async fn dispatch(
        &self,
        owner_id: &str,
        tool: ToolId,
        params: &Value,
    ) -> Result<Observation, ToolError> {
        let result = match tool {
            ToolId::FetchContent => fetch_content::run(self, owner_id, params).await,
            ToolId::CreateDocument => create_document::run(self, owner_id, params).await,
            ToolId::WebSearch => web_search::run(self, owner_id, params).await,
            ToolId::SendEmail => send_email::run(self, owner_id, params).await,
        };
        if let Err(e) = &result {
            warn!("tool {} failed: {}", tool.as_str(), e);
        }
        result
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip() {
        for tool in ToolId::ALL {
            assert_eq!(ToolId::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolId::parse("FETCH_CONTENT"), Some(ToolId::FetchContent));
        assert_eq!(ToolId::parse("delete_everything"), None);
    }

    #[test]
    fn require_str_rejects_blank_and_missing() {
        let params = serde_json::json!({"query": "  ", "ok": "x"});
        assert!(require_str(&params, "query").is_err());
        assert!(require_str(&params, "absent").is_err());
        assert_eq!(require_str(&params, "ok").unwrap(), "x");
    }
}
