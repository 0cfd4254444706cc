//! Wire-format helpers applied at the store boundary.
//!
//! Writes are sparse: a field that is absent from the caller's struct is
//! omitted from the outgoing document rather than sent as a null placeholder,
//! and server-owned fields (`id`, `createdAt`, `updatedAt`) are never sent.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PkError, PkResult};
use crate::traits::Document;

/// Fields owned by the remote store; stripped from every outgoing write.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Serialize a value into a raw document. Fails if the value is not a JSON
/// object (entities and patches always are).
pub fn to_document<T: Serialize>(value: &T) -> PkResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(PkError::InvalidArgument(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Remove server-owned fields from an outgoing document.
pub fn strip_reserved(doc: &mut Document) {
    for field in RESERVED_FIELDS {
        doc.remove(field);
    }
}

/// Remove top-level null fields: absence is expressed by omission on the wire.
pub fn strip_nulls(doc: &mut Document) {
    doc.retain(|_, value| !value.is_null());
}

/// The outgoing form of a create: the full draft minus server-owned fields
/// and minus explicit absence markers.
pub fn for_create<T: Serialize>(draft: &T) -> PkResult<Document> {
    let mut doc = to_document(draft)?;
    strip_reserved(&mut doc);
    strip_nulls(&mut doc);
    Ok(doc)
}

/// The outgoing form of a partial update: only the supplied fields.
pub fn for_update<T: Serialize>(patch: &T) -> PkResult<Document> {
    let mut doc = to_document(patch)?;
    strip_reserved(&mut doc);
    strip_nulls(&mut doc);
    Ok(doc)
}

/// Decode a stored document into a typed record.
pub fn decode<T: DeserializeOwned>(doc: Document) -> PkResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, CandidatePatch, Lead};
    use serde_json::json;

    #[test]
    fn for_create_strips_reserved_and_null_fields() {
        let mut draft = Lead::new("Acme", "Jo", "jo@acme.com", "Website");
        draft.id = "client-supplied".into();

        let doc = for_create(&draft).unwrap();
        assert!(!doc.contains_key("id"));
        assert!(!doc.contains_key("createdAt"));
        assert!(!doc.contains_key("updatedAt"));
        assert_eq!(doc["companyName"], "Acme");
    }

    #[test]
    fn for_update_drops_explicit_nulls() {
        let patch = json!({
            "notes": "called twice",
            "assignedTo": null,
            "updatedAt": "2020-01-01T00:00:00Z",
        });
        let doc = for_update(&patch).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc["notes"], "called twice");
    }

    #[test]
    fn candidate_patch_produces_single_field_document() {
        let patch = CandidatePatch {
            opportunity_id: Some("OPP1".into()),
            ..Default::default()
        };
        let doc = for_update(&patch).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc["opportunityId"], "OPP1");
    }

    #[test]
    fn decode_round_trips_a_stored_record() {
        let draft = Candidate::new("A", "a@x.com").with_skills(vec!["Go".into()]);
        let mut doc = to_document(&draft).unwrap();
        doc.insert("id".into(), json!("cand-1"));

        let decoded: Candidate = decode(doc).unwrap();
        assert_eq!(decoded.id, "cand-1");
        assert_eq!(decoded.skills, vec!["Go".to_string()]);
    }

    #[test]
    fn non_object_values_are_rejected() {
        let err = to_document(&json!(42)).unwrap_err();
        assert!(matches!(err, PkError::InvalidArgument(_)));
    }
}
