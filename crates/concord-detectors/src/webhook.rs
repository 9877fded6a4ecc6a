use chrono::Utc;
use concord_core::types::{ChangeEvent, ChangeKind, TrackerSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw shape of a `POST /webhook` body (§6): `{type, changes: [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct HulyWebhookPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub changes: Vec<HulyWebhookChangeDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HulyWebhookChangeDto {
    pub entity: String,
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub before: Option<serde_json::Value>,
    #[serde(default)]
    pub after: Option<serde_json::Value>,
}

/// A single normalized change decoded from a webhook POST, carrying the raw
/// DTO for forensic logging (§9 "dynamic event payloads").
#[derive(Debug, Clone, Serialize)]
pub struct HulyWebhookChange {
    pub event: ChangeEvent,
    /// Deterministic workflow id this change coalesces onto (§4.4: "Coalesces
    /// duplicates by workflow id `huly-webhook-<type>-<entityRef>`").
    pub workflow_id: String,
}

#[derive(Debug, Error)]
pub enum WebhookDecodeError {
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
}

fn change_kind_from_str(raw: &str) -> ChangeKind {
    match raw {
        "create" | "created" => ChangeKind::Create,
        "update" | "updated" => ChangeKind::Update,
        "delete" | "deleted" | "removed" => ChangeKind::Delete,
        _ => ChangeKind::Unknown,
    }
}

/// Decode a raw webhook request body into normalized changes. Each DTO's
/// `before`/`after` are folded into the event's opaque `raw` payload so the
/// original wire shape survives for forensic logging even though only
/// `entity`/`id`/`kind` drive the sync workflow itself.
pub fn decode_webhook_payload(body: &[u8]) -> Result<Vec<HulyWebhookChange>, WebhookDecodeError> {
    let payload: HulyWebhookPayload =
        serde_json::from_slice(body).map_err(|e| WebhookDecodeError::Malformed(e.to_string()))?;

    let changes = payload
        .changes
        .into_iter()
        .map(|dto| {
            let workflow_id = format!("huly-webhook-{}-{}", payload.kind, dto.id);
            let event = ChangeEvent {
                source: TrackerSource::Huly,
                entity_ref: dto.id.clone(),
                kind: change_kind_from_str(&dto.kind),
                payload: serde_json::json!({
                    "entity": dto.entity,
                    "type": payload.kind,
                    "before": dto.before,
                    "after": dto.after,
                }),
                observed_at: Utc::now(),
                correlation_id: uuid::Uuid::new_v4().to_string(),
            };
            HulyWebhookChange { event, workflow_id }
        })
        .collect();

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_change() {
        let body = br#"{"type":"issue","changes":[{"entity":"issue","id":"PROJ-9","kind":"update"}]}"#;
        let changes = decode_webhook_payload(body).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].event.entity_ref, "PROJ-9");
        assert_eq!(changes[0].event.kind, ChangeKind::Update);
        assert_eq!(changes[0].workflow_id, "huly-webhook-issue-PROJ-9");
    }

    #[test]
    fn two_posts_for_same_entity_produce_same_workflow_id() {
        let body = br#"{"type":"issue","changes":[{"entity":"issue","id":"PROJ-9","kind":"update"}]}"#;
        let first = decode_webhook_payload(body).unwrap();
        let second = decode_webhook_payload(body).unwrap();
        assert_eq!(first[0].workflow_id, second[0].workflow_id);
    }

    #[test]
    fn unknown_kind_decodes_as_unknown() {
        let body = br#"{"type":"issue","changes":[{"entity":"issue","id":"PROJ-1","kind":"weird"}]}"#;
        let changes = decode_webhook_payload(body).unwrap();
        assert_eq!(changes[0].event.kind, ChangeKind::Unknown);
    }

    #[test]
    fn malformed_body_is_rejected() {
        let result = decode_webhook_payload(b"not json");
        assert!(result.is_err());
    }

    #[test]
    fn multiple_changes_each_get_own_workflow_id() {
        let body = br#"{"type":"issue","changes":[
            {"entity":"issue","id":"A-1","kind":"create"},
            {"entity":"issue","id":"A-2","kind":"delete"}
        ]}"#;
        let changes = decode_webhook_payload(body).unwrap();
        assert_eq!(changes.len(), 2);
        assert_ne!(changes[0].workflow_id, changes[1].workflow_id);
    }
}
