//! Shared shape of the list documents: `{ "items": [ … ] }`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use nest_store::{DocRef, DocumentSnapshot};

use crate::error::NestError;

#[derive(Deserialize)]
struct ItemsDocument<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Items stored in `doc`, empty when the document is missing.
pub(crate) fn load<T: DeserializeOwned>(doc: &DocRef) -> Result<Vec<T>, NestError> {
    Ok(doc
        .get_as::<ItemsDocument<T>>()?
        .map(|d| d.items)
        .unwrap_or_default())
}

/// Items carried by a snapshot. Undecodable data is logged and read as empty.
pub(crate) fn from_snapshot<T: DeserializeOwned>(snapshot: &DocumentSnapshot) -> Vec<T> {
    let Some(items) = snapshot.get("items") else {
        return Vec::new();
    };
    serde_json::from_value(items.clone()).unwrap_or_else(|e| {
        log::warn!(
            "Undecodable items in {}/{}: {e}",
            snapshot.collection(),
            snapshot.doc_id()
        );
        Vec::new()
    })
}

/// Replace the item list: merged into an existing document, or written as a
/// new one.
pub(crate) fn store<T: Serialize>(doc: &DocRef, items: &[T]) -> Result<(), NestError> {
    let body = ItemsDocumentRef { items };
    if doc.exists()? {
        doc.update_as(&body)?;
    } else {
        doc.set_as(&body)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct ItemsDocumentRef<'a, T> {
    items: &'a [T],
}

#[cfg(test)]
mod tests {
    use super::*;
    use nest_store::{Database, MemoryStorage};
    use serde_json::json;
    use std::sync::Arc;

    /// Deliberately without `Default`.
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
    }

    fn doc() -> DocRef {
        Database::open(Arc::new(MemoryStorage::new())).doc("timesToDo", "812_917")
    }

    #[test]
    fn test_load_missing_items_field() {
        let doc = doc();
        assert!(load::<Entry>(&doc).unwrap().is_empty());

        let mut body = serde_json::Map::new();
        body.insert("title".into(), json!("ours"));
        doc.set(body).unwrap();
        assert!(load::<Entry>(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_store_then_load() {
        let doc = doc();
        store(&doc, &[Entry { id: "a".into() }]).unwrap();
        store(&doc, &[Entry { id: "a".into() }, Entry { id: "b".into() }]).unwrap();
        let entries: Vec<Entry> = load(&doc).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], Entry { id: "b".into() });
    }
}
