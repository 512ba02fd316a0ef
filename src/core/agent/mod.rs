mod envelope;
mod prompts;

pub use envelope::{ActionCall, EnvelopeKind, parse_envelope};

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::llm::{ChatMessage, LlmManager};
use crate::core::tools::{Observation, ToolId, ToolRegistry};

/// How many consecutive malformed model replies are retried before the
/// session is declared failed.
const PARSE_RETRY_LIMIT: u32 = 2;

pub const DEFAULT_MAX_TURNS: usize = 8;

/// How a session ended. `Failed` is the only fatal variant; the other two
/// both carry a usable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(String),
    MaxTurnsReached(String),
    Failed(String),
}

impl SessionOutcome {
    pub fn text(&self) -> &str {
        match self {
            SessionOutcome::Completed(t)
            | SessionOutcome::MaxTurnsReached(t)
            | SessionOutcome::Failed(t) => t,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SessionOutcome::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed(_) => "completed",
            SessionOutcome::MaxTurnsReached(_) => "max_turns_reached",
            SessionOutcome::Failed(_) => "failed",
        }
    }
}

/// Runs the bounded reason/act/observe loop for one user turn. One model
/// call and one tool call at a time; all cross-session state lives in the
/// store.
pub struct AgentOrchestrator {
    llm: Arc<RwLock<LlmManager>>,
    tools: Arc<ToolRegistry>,
    max_turns: usize,
}

impl AgentOrchestrator {
    pub fn new(llm: Arc<RwLock<LlmManager>>, tools: Arc<ToolRegistry>, max_turns: usize) -> Self {
        Self {
            llm,
            tools,
            max_turns: max_turns.max(1),
        }
    }

    pub async fn run_session(&self, owner_id: &str, user_message: &str) -> Result<SessionOutcome> {
        let mut messages = vec![
            ChatMessage::new("system", prompts::system_prompt()),
            ChatMessage::new("user", user_message),
        ];
        let mut consecutive_parse_failures: u32 = 0;

        for turn in 1..=self.max_turns {
            let raw = self.generate(&messages).await?;
            messages.push(ChatMessage::new("assistant", raw.clone()));

            let env = match parse_envelope(&raw) {
                Ok(env) => {
                    consecutive_parse_failures = 0;
                    env
                }
                Err(parse_err) => {
                    consecutive_parse_failures += 1;
                    warn!(
                        turn,
                        attempt = consecutive_parse_failures,
                        "unparseable model output: {}",
                        parse_err
                    );
                    if consecutive_parse_failures > PARSE_RETRY_LIMIT {
                        return Ok(SessionOutcome::Failed(format!(
                            "model failed to produce a valid reply after {} attempts: {}",
                            consecutive_parse_failures, parse_err
                        )));
                    }
                    push_observation(
                        &mut messages,
                        &Observation::error(json!({
                            "error": format!("could not parse your reply: {parse_err}"),
                            "hint": "reply with a single JSON envelope",
                        })),
                    );
                    continue;
                }
            };

            match env.kind {
                EnvelopeKind::Response => {
                    let text = env.response.unwrap_or_default();
                    info!(turn, outcome = "completed", "session finished");
                    return Ok(SessionOutcome::Completed(text));
                }
                EnvelopeKind::Action => {
                    let action = env.action.expect("validated by parse_envelope");
                    let observation = self.run_action(owner_id, turn, &action).await;
                    push_observation(&mut messages, &observation);
                }
            }
        }

        // Turn budget spent without a response. One forced summary call;
        // whatever comes back is the final answer.
        messages.push(ChatMessage::new("user", prompts::FORCED_SUMMARY_PROMPT));
        let raw = self.generate(&messages).await?;
        let text = match parse_envelope(&raw) {
            Ok(env) => env.response.or(env.thought).unwrap_or(raw),
            Err(_) => raw,
        };
        info!(outcome = "max_turns_reached", "session finished");
        Ok(SessionOutcome::MaxTurnsReached(text))
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let llm = self.llm.read().await;
        llm.generate_with_selected(messages).await
    }

    /// Resolve and execute one action. Every failure mode collapses into an
    /// error observation so the loop keeps going.
    async fn run_action(&self, owner_id: &str, turn: usize, action: &ActionCall) -> Observation {
        let started = Instant::now();
        let observation = match ToolId::parse(&action.name) {
            None => Observation::error(json!({
                "error": format!("unknown tool '{}'", action.name),
            })),
            Some(tool) => match self
                .tools
                .dispatch(owner_id, tool, &action.parameters)
                .await
            {
                Ok(obs) => obs,
                Err(e) => Observation::error(json!({ "error": e.to_string() })),
            },
        };
        info!(
            turn,
            action = %action.name,
            duration_ms = started.elapsed().as_millis() as u64,
            success = !observation.is_error,
            "tool step"
        );
        observation
    }
}

fn push_observation(messages: &mut Vec<ChatMessage>, observation: &Observation) {
    messages.push(ChatMessage::new(
        "user",
        format!("Observation: {}", observation.payload),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::{LlmProvider, ProviderType};
    use crate::core::tools::test_support::{RecordingMailer, test_registry};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script of model replies and counts the calls.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        calls: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_type(&self) -> ProviderType {
            ProviderType::OpenAI
        }

        async fn generate(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    async fn orchestrator_with_script(
        replies: &[&str],
        max_turns: usize,
    ) -> (AgentOrchestrator, Arc<Mutex<usize>>, Arc<RecordingMailer>) {
        let (registry, _store, mailer) = test_registry().await;
        let calls = Arc::new(Mutex::new(0));
        let mut manager = LlmManager::new();
        manager.register_provider(Box::new(ScriptedProvider {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            calls: calls.clone(),
        }));
        manager.set_active(ProviderType::OpenAI, "scripted".to_string());
        let orchestrator = AgentOrchestrator::new(
            Arc::new(RwLock::new(manager)),
            Arc::new(registry),
            max_turns,
        );
        (orchestrator, calls, mailer)
    }

    fn response(text: &str) -> String {
        serde_json::json!({"thought": "done", "type": "response", "response": text}).to_string()
    }

    fn action(name: &str, parameters: serde_json::Value) -> String {
        serde_json::json!({
            "thought": "working",
            "type": "action",
            "action": {"name": name, "parameters": parameters},
        })
        .to_string()
    }

    #[tokio::test]
    async fn immediate_response_completes_in_one_call() {
        let (orch, calls, _) = orchestrator_with_script(&[&response("42")], 8).await;
        let outcome = orch.run_session("u", "what is the answer").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed("42".to_string()));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn action_result_feeds_the_next_turn() {
        let send = action(
            "send_email",
            serde_json::json!({
                "recipient_email": "ada@example.com", "subject": "s", "body": "b",
            }),
        );
        let (orch, calls, mailer) =
            orchestrator_with_script(&[&send, &response("sent it")], 8).await;

        let outcome = orch.run_session("u", "email ada").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed("sent it".to_string()));
        assert_eq!(*calls.lock().unwrap(), 2);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_observation_and_loop_continues() {
        let bad = action("time_travel", serde_json::json!({}));
        let (orch, calls, _) = orchestrator_with_script(&[&bad, &response("ok")], 8).await;
        let outcome = orch.run_session("u", "hi").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed("ok".to_string()));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn tool_validation_error_becomes_observation() {
        // send_email without a subject fails parameter validation.
        let bad = action("send_email", serde_json::json!({"body": "b"}));
        let (orch, _, mailer) = orchestrator_with_script(&[&bad, &response("gave up")], 8).await;
        let outcome = orch.run_session("u", "hi").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed("gave up".to_string()));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_twice_then_valid_succeeds_in_three_calls() {
        let (orch, calls, _) =
            orchestrator_with_script(&["garbage", "more garbage", &response("recovered")], 8).await;
        let outcome = orch.run_session("u", "hi").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed("recovered".to_string()));
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn malformed_three_times_is_fatal() {
        let (orch, calls, _) =
            orchestrator_with_script(&["junk", "junk", "junk", &response("never used")], 8).await;
        let outcome = orch.run_session("u", "hi").await.unwrap();
        assert!(outcome.is_failure());
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn parse_failure_counter_resets_on_valid_reply() {
        let probe = action("web_search", serde_json::json!({"query": "q"}));
        // Failures interleaved with valid envelopes never reach the limit.
        let (orch, _, _) = orchestrator_with_script(
            &["junk", &probe, "junk", &probe, "junk", &response("fine")],
            8,
        )
        .await;
        let outcome = orch.run_session("u", "hi").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed("fine".to_string()));
    }

    #[tokio::test]
    async fn turn_budget_forces_summary_with_bounded_calls() {
        let probe = action("web_search", serde_json::json!({"query": "q"}));
        let script: Vec<String> = (0..3)
            .map(|_| probe.clone())
            .chain(std::iter::once("summary of findings".to_string()))
            .collect();
        let refs: Vec<&str> = script.iter().map(String::as_str).collect();
        let (orch, calls, _) = orchestrator_with_script(&refs, 3).await;

        let outcome = orch.run_session("u", "research this").await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::MaxTurnsReached("summary of findings".to_string())
        );
        // max_turns + 1 is the hard ceiling on model calls.
        assert_eq!(*calls.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn forced_summary_unwraps_an_envelope_reply() {
        let probe = action("web_search", serde_json::json!({"query": "q"}));
        let summary = response("wrapped summary");
        let (orch, _, _) = orchestrator_with_script(&[&probe, &summary], 1).await;
        let outcome = orch.run_session("u", "hi").await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::MaxTurnsReached("wrapped summary".to_string())
        );
    }
}
