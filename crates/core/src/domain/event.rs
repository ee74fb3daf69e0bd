// Inbound Repository Events
//
// The bus carries two envelope generations: the legacy flat shape
// `{event: "<name>", payload: {...}}` and the newer nested shape
// `{event: {type: "<name>", data: {...}}}`. Both deserialize into one
// untagged union and every shape tolerance lives in `normalize`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InboundEvent {
    Legacy {
        event: String,
        #[serde(default)]
        payload: Option<LegacyPayload>,
    },
    Envelope {
        event: EnvelopeEvent,
    },
}

#[derive(Debug, Deserialize)]
pub struct LegacyPayload {
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryRef {
    pub id: Option<String>,
    #[serde(rename = "ingestStatus")]
    pub ingest_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeData {
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(rename = "repositoryId")]
    pub repository_id: Option<String>,
    #[serde(rename = "ingestStatus")]
    pub ingest_status: Option<String>,
    #[serde(default)]
    pub event: Option<EnvelopeInnerEvent>,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeInnerEvent {
    #[serde(rename = "repositoryId")]
    pub repository_id: Option<String>,
    pub status: Option<String>,
}

/// The single shape admission works with, whatever envelope arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub name: String,
    pub repository_id: Option<String>,
    pub ingest_status: Option<String>,
}

impl NormalizedEvent {
    pub fn is_repository_event(&self) -> bool {
        self.name.starts_with("repository.")
    }
}

impl InboundEvent {
    /// Field-wise precedence: `data.repository.*`, then the flat
    /// `data.repositoryId`/`data.ingestStatus`, then the nested
    /// `data.event.{repositoryId, status}`.
    pub fn normalize(self) -> NormalizedEvent {
        match self {
            InboundEvent::Legacy { event, payload } => {
                let repository = payload.and_then(|p| p.repository);
                NormalizedEvent {
                    name: event,
                    repository_id: repository.as_ref().and_then(|r| r.id.clone()),
                    ingest_status: repository.and_then(|r| r.ingest_status),
                }
            }
            InboundEvent::Envelope { event } => {
                let data = event.data;
                let repository_id = data
                    .as_ref()
                    .and_then(|d| d.repository.as_ref().and_then(|r| r.id.clone()))
                    .or_else(|| data.as_ref().and_then(|d| d.repository_id.clone()))
                    .or_else(|| {
                        data.as_ref()
                            .and_then(|d| d.event.as_ref().and_then(|e| e.repository_id.clone()))
                    });
                let ingest_status = data
                    .as_ref()
                    .and_then(|d| d.repository.as_ref().and_then(|r| r.ingest_status.clone()))
                    .or_else(|| data.as_ref().and_then(|d| d.ingest_status.clone()))
                    .or_else(|| {
                        data.as_ref()
                            .and_then(|d| d.event.as_ref().and_then(|e| e.status.clone()))
                    });
                NormalizedEvent {
                    name: event.kind,
                    repository_id,
                    ingest_status,
                }
            }
        }
    }
}

/// Parse one raw bus message. Returns `None` for malformed JSON or a
/// JSON value matching neither envelope shape; the caller logs and drops.
pub fn parse_event(raw: &str) -> Option<NormalizedEvent> {
    serde_json::from_str::<InboundEvent>(raw)
        .ok()
        .map(InboundEvent::normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_shape_normalizes() {
        let raw = r#"{"event":"repository.updated","payload":{"repository":{"id":"r1","ingestStatus":"ready"}}}"#;
        let event = parse_event(raw).unwrap();
        assert_eq!(event.name, "repository.updated");
        assert_eq!(event.repository_id.as_deref(), Some("r1"));
        assert_eq!(event.ingest_status.as_deref(), Some("ready"));
    }

    #[test]
    fn envelope_shape_normalizes() {
        let raw = r#"{"event":{"type":"repository.ingestion-event","data":{"repository":{"id":"r2","ingestStatus":"ready"}}}}"#;
        let event = parse_event(raw).unwrap();
        assert_eq!(event.name, "repository.ingestion-event");
        assert_eq!(event.repository_id.as_deref(), Some("r2"));
        assert_eq!(event.ingest_status.as_deref(), Some("ready"));
    }

    #[test]
    fn envelope_falls_back_to_flat_fields() {
        let raw = r#"{"event":{"type":"repository.updated","data":{"repositoryId":"r3","ingestStatus":"pending"}}}"#;
        let event = parse_event(raw).unwrap();
        assert_eq!(event.repository_id.as_deref(), Some("r3"));
        assert_eq!(event.ingest_status.as_deref(), Some("pending"));
    }

    #[test]
    fn envelope_falls_back_to_nested_event_fields() {
        let raw = r#"{"event":{"type":"repository.ingestion-event","data":{"event":{"repositoryId":"r4","status":"ready"}}}}"#;
        let event = parse_event(raw).unwrap();
        assert_eq!(event.repository_id.as_deref(), Some("r4"));
        assert_eq!(event.ingest_status.as_deref(), Some("ready"));
    }

    #[test]
    fn repository_block_wins_over_flat_and_nested() {
        let raw = r#"{"event":{"type":"repository.updated","data":{"repository":{"id":"a","ingestStatus":"ready"},"repositoryId":"b","event":{"repositoryId":"c","status":"failed"}}}}"#;
        let event = parse_event(raw).unwrap();
        assert_eq!(event.repository_id.as_deref(), Some("a"));
        assert_eq!(event.ingest_status.as_deref(), Some("ready"));
    }

    #[test]
    fn malformed_json_is_none() {
        assert!(parse_event("not json").is_none());
        assert!(parse_event(r#"{"something":"else"}"#).is_none());
    }

    #[test]
    fn missing_repository_id_is_preserved_as_none() {
        let raw = r#"{"event":"repository.updated","payload":{}}"#;
        let event = parse_event(raw).unwrap();
        assert!(event.repository_id.is_none());
    }

    #[test]
    fn non_repository_events_are_flagged() {
        let raw = r#"{"event":"build.completed","payload":{}}"#;
        let event = parse_event(raw).unwrap();
        assert!(!event.is_repository_event());
    }
}
