use serde::Deserialize;
use serde_json::Value;

/// The structured reply the model must produce every turn.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub thought: Option<String>,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub action: Option<ActionCall>,
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Action,
    Response,
}

#[derive(Debug, Deserialize)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Extract and parse the envelope from raw model output. Models routinely
/// wrap JSON in markdown fences or preamble text, so this takes the
/// outermost brace span rather than requiring the whole reply to be JSON.
pub fn parse_envelope(raw: &str) -> Result<Envelope, String> {
    let cleaned: String = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let start = cleaned
        .find('{')
        .ok_or_else(|| "no JSON object in model output".to_string())?;
    let end = cleaned
        .rfind('}')
        .ok_or_else(|| "unterminated JSON object in model output".to_string())?;
    if end < start {
        return Err("unterminated JSON object in model output".to_string());
    }

    let envelope: Envelope = serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| format!("envelope does not match expected schema: {e}"))?;

    match envelope.kind {
        EnvelopeKind::Action if envelope.action.is_none() => {
            Err("type is \"action\" but no action object was given".to_string())
        }
        EnvelopeKind::Response if envelope.response.is_none() => {
            Err("type is \"response\" but no response text was given".to_string())
        }
        _ => Ok(envelope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_action_envelope() {
        let env = parse_envelope(
            r#"{"thought": "look it up", "type": "action",
                "action": {"name": "fetch_content", "parameters": {"query": "q"}}}"#,
        )
        .unwrap();
        assert_eq!(env.kind, EnvelopeKind::Action);
        let action = env.action.unwrap();
        assert_eq!(action.name, "fetch_content");
        assert_eq!(action.parameters["query"], "q");
    }

    #[test]
    fn parses_fenced_envelope_with_preamble() {
        let raw = "Here is my answer:\n```json\n{\"type\": \"response\", \"response\": \"done\"}\n```";
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Response);
        assert_eq!(env.response.as_deref(), Some("done"));
    }

    #[test]
    fn rejects_prose_without_json() {
        assert!(parse_envelope("I could not decide what to do.").is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(parse_envelope(r#"{"type": "thinking", "response": "x"}"#).is_err());
    }

    #[test]
    fn rejects_action_without_action_object() {
        let err = parse_envelope(r#"{"type": "action", "response": "x"}"#).unwrap_err();
        assert!(err.contains("no action object"));
    }

    #[test]
    fn rejects_response_without_text() {
        assert!(parse_envelope(r#"{"type": "response"}"#).is_err());
    }

    #[test]
    fn missing_parameters_default_to_null() {
        let env = parse_envelope(
            r#"{"type": "action", "action": {"name": "web_search"}}"#,
        )
        .unwrap();
        assert!(env.action.unwrap().parameters.is_null());
    }
}
