//! Helpers for building and reading Qdrant payloads.

use super::types::StoredRecord;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Payload field holding the textual record identifier.
pub const RECORD_ID_FIELD: &str = "record_id";
/// Payload field holding the indexed text.
pub const TEXT_FIELD: &str = "text";
/// Payload field every record of one document shares.
pub const DOCUMENT_ID_FIELD: &str = "document_id";

/// Deterministic Qdrant point id for a textual record id.
///
/// Qdrant only accepts integers and UUIDs as point ids, so `<fingerprint>_chunk<n>` maps to a
/// name-based UUID; the same record id always lands on the same point.
pub fn point_id(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

/// Build the payload stored alongside a record: caller metadata plus id and text.
pub(crate) fn build_payload(record_id: &str, text: &str, metadata: Map<String, Value>) -> Value {
    let mut payload = metadata;
    payload.insert(RECORD_ID_FIELD.into(), Value::String(record_id.to_string()));
    payload.insert(TEXT_FIELD.into(), Value::String(text.to_string()));
    Value::Object(payload)
}

/// Split a stored payload back into a record. Payloads without a record id are skipped.
pub(crate) fn record_from_payload(mut payload: Map<String, Value>) -> Option<StoredRecord> {
    let id = match payload.remove(RECORD_ID_FIELD)? {
        Value::String(id) => id,
        _ => return None,
    };
    let text = match payload.remove(TEXT_FIELD) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    Some(StoredRecord {
        id,
        text,
        metadata: payload,
    })
}

/// Current timestamp formatted as RFC 3339.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn point_ids_are_stable_per_record() {
        assert_eq!(point_id("abc_chunk0"), point_id("abc_chunk0"));
        assert_ne!(point_id("abc_chunk0"), point_id("abc_chunk1"));
        assert_eq!(point_id("abc").get_version_num(), 5);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn payload_round_trips_into_record() {
        let mut metadata = Map::new();
        metadata.insert("size".into(), json!(42));
        let payload = build_payload("doc_chunk1", "hello", metadata);
        assert_eq!(payload[RECORD_ID_FIELD], "doc_chunk1");
        assert_eq!(payload[TEXT_FIELD], "hello");

        let Value::Object(map) = payload else {
            panic!("payload should be an object");
        };
        let record = record_from_payload(map).unwrap();
        assert_eq!(record.id, "doc_chunk1");
        assert_eq!(record.text, "hello");
        assert_eq!(record.metadata.get("size"), Some(&json!(42)));
        assert!(!record.metadata.contains_key(TEXT_FIELD));
    }

    #[test]
    fn payload_without_record_id_is_ignored() {
        let map = json!({ "text": "orphan" }).as_object().cloned().unwrap();
        assert!(record_from_payload(map).is_none());
    }
}
