//! Mapping between [`Presentation`] and its stored JSON document.

use super::entity::Presentation;
use crate::core::{PersistError, Result};
use crate::storage::StoredDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Discriminator value shared by every presentation document.
pub const PRESENTATION_TYPE: &str = "presentation";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresentationDocument {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    up_votes: u32,
    down_votes: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
}

pub fn encode(presentation: &Presentation) -> Result<JsonValue> {
    let document = PresentationDocument {
        kind: PRESENTATION_TYPE.to_string(),
        title: presentation.title().to_string(),
        up_votes: presentation.up_votes(),
        down_votes: presentation.down_votes(),
        created_at: presentation.created_at(),
    };
    Ok(serde_json::to_value(document)?)
}

/// Decodes a stored document into a clean entity carrying its identifier and revision.
pub fn decode(document: StoredDocument) -> Result<Presentation> {
    let StoredDocument { revision, content } = document;
    let decoded: PresentationDocument = serde_json::from_value(content).map_err(|err| {
        PersistError::Codec(format!("document '{}': {}", revision.id(), err))
    })?;
    if decoded.kind != PRESENTATION_TYPE {
        return Err(PersistError::Codec(format!(
            "document '{}' has type '{}', expected '{}'",
            revision.id(),
            decoded.kind,
            PRESENTATION_TYPE
        )));
    }

    Ok(Presentation::hydrate(
        revision,
        decoded.title,
        decoded.created_at,
        decoded.up_votes,
        decoded.down_votes,
    ))
}
