use crate::shared::ResourceId;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification POST to {url} failed: {reason}")]
    Http { url: String, reason: String },
}

/// Posts a workflow completion notice to the configured endpoint. The body
/// names the resource and the event so the consumer needs no follow-up query.
pub fn send_completion_notice(
    endpoint: &str,
    resource: ResourceId,
    event: &str,
) -> Result<(), NotifyError> {
    let body = json!({
        "resource_id": resource.value(),
        "event": event,
        "sent_at": crate::shared::now_secs(),
    });
    ureq::post(endpoint)
        .send_json(body)
        .map_err(|err| NotifyError::Http {
            url: endpoint.to_string(),
            reason: err.to_string(),
        })?;
    Ok(())
}
