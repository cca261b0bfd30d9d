use qbsync_traits::{EntityKind, PageCursor};
use serde::Deserialize;
use serde_json::Value;

/// One remote record as returned by the query endpoint.
///
/// The payload keeps the raw JSON shape; per-entity projection into a
/// local record happens in the sync engine's mapping layer. Produced
/// transiently per page and dropped after mapping.
#[derive(Debug, Clone)]
pub struct RemoteEntity {
    pub kind: EntityKind,
    pub payload: Value,
}

impl RemoteEntity {
    /// The remote identifier, used as the local reconciliation key.
    pub fn id(&self) -> Option<&str> {
        self.payload.get("Id").and_then(Value::as_str)
    }

    /// QuickBooks optimistic-concurrency token for this record version.
    pub fn version_token(&self) -> Option<&str> {
        self.payload.get("SyncToken").and_then(Value::as_str)
    }
}

/// One page of query results.
#[derive(Debug)]
pub struct QueryPage {
    pub entities: Vec<RemoteEntity>,
    /// Position of the next page, `None` when this page was the last.
    pub next_cursor: Option<PageCursor>,
}

impl QueryPage {
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Error envelope QuickBooks returns on failed requests.
#[derive(Debug, Deserialize)]
pub(crate) struct FaultEnvelope {
    #[serde(rename = "Fault")]
    pub fault: Fault,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Fault {
    #[serde(rename = "Error", default)]
    pub errors: Vec<FaultError>,
    #[serde(rename = "type", default)]
    pub fault_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FaultError {
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Detail", default)]
    pub detail: Option<String>,
    #[serde(rename = "code", default)]
    pub code: Option<String>,
}

impl Fault {
    /// Flattens the fault into a single diagnostic string.
    pub fn describe(&self) -> String {
        let first = self.errors.first();
        let code = first.and_then(|e| e.code.as_deref()).unwrap_or("?");
        let message = first
            .and_then(|e| e.message.as_deref())
            .unwrap_or("unknown fault");
        let detail = first.and_then(|e| e.detail.as_deref());
        let fault_type = self.fault_type.as_deref().unwrap_or("Fault");
        match detail {
            Some(d) => format!("{fault_type} code {code}: {message} ({d})"),
            None => format!("{fault_type} code {code}: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_entity_accessors() {
        let entity = RemoteEntity {
            kind: EntityKind::Customer,
            payload: json!({"Id": "42", "SyncToken": "3", "DisplayName": "Acme"}),
        };
        assert_eq!(entity.id(), Some("42"));
        assert_eq!(entity.version_token(), Some("3"));
    }

    #[test]
    fn fault_describe_includes_code_and_detail() {
        let envelope: FaultEnvelope = serde_json::from_str(
            r#"{"Fault":{"Error":[{"Message":"Invalid query","Detail":"bad column","code":"4000"}],"type":"ValidationFault"}}"#,
        )
        .unwrap();
        let described = envelope.fault.describe();
        assert!(described.contains("4000"));
        assert!(described.contains("Invalid query"));
        assert!(described.contains("bad column"));
    }
}
