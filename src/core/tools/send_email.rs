use regex::Regex;
use serde_json::{Value, json};
use std::sync::OnceLock;
use tracing::warn;

use super::{Observation, ToolError, ToolRegistry, optional_i64, optional_str, require_str};
use crate::core::mailer::OutgoingEmail;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"))
}

/// Send an email on the caller's behalf. Every attempt, including rejected
/// input, lands in the email log; the outcome comes back as an observation
/// so a bounce never kills the session.
pub async fn run(
    ctx: &ToolRegistry,
    owner_id: &str,
    params: &Value,
) -> Result<Observation, ToolError> {
    let subject = require_str(params, "subject")?;
    let body = require_str(params, "body")?;
    let recipient_name = optional_str(params, "recipient_name").unwrap_or("");

    let recipient_email = match optional_str(params, "recipient_email") {
        Some(addr) if !addr.trim().is_empty() => addr.trim().to_string(),
        _ => {
            return failed_observation(ctx, owner_id, "", subject, "missing recipient").await;
        }
    };
    if !email_regex().is_match(&recipient_email) {
        let message = format!("invalid recipient email '{recipient_email}'");
        return failed_observation(ctx, owner_id, &recipient_email, subject, &message).await;
    }

    let attachment_path = match optional_i64(params, "attachment_id") {
        Some(id) => {
            let found = ctx
                .store
                .get_generated_document(owner_id, id)
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            match found {
                Some(doc) => Some(doc.file_path),
                None => {
                    let message = format!("unknown attachment id {id}");
                    return failed_observation(ctx, owner_id, &recipient_email, subject, &message)
                        .await;
                }
            }
        }
        None => None,
    };

    let email = OutgoingEmail {
        recipient_name: recipient_name.to_string(),
        recipient_email: recipient_email.clone(),
        subject: subject.to_string(),
        body: body.to_string(),
        attachment_path,
    };

    match ctx.mailer.send(&email).await {
        Ok(()) => {
            ctx.store
                .log_email(owner_id, &recipient_email, subject, "sent", None)
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            Ok(Observation::success(json!({
                "status": "sent",
                "recipient": recipient_email,
            })))
        }
        Err(e) => {
            let message = e.to_string();
            warn!("email to {} failed: {}", recipient_email, message);
            failed_observation(ctx, owner_id, &recipient_email, subject, &message).await
        }
    }
}

async fn failed_observation(
    ctx: &ToolRegistry,
    owner_id: &str,
    recipient: &str,
    subject: &str,
    message: &str,
) -> Result<Observation, ToolError> {
    ctx.store
        .log_email(owner_id, recipient, subject, "failed", Some(message))
        .await
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
    Ok(Observation::error(json!({
        "status": "failed",
        "error_message": message,
    })))
}
