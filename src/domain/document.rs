use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::fingerprint::fingerprint;
use crate::domain::product::ProductRecord;
use crate::domain::value_objects::{Fingerprint, ProductId};

/// A document as read back from a realtime document store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// The store's own identifier for the document.
    pub id: String,
    /// Server-assigned creation time; listings are ordered by it.
    pub created_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl StoredDocument {
    /// The product carried by this document, keyed by the document id.
    ///
    /// Fields that cannot be typed are dropped rather than losing the whole
    /// document from the listing.
    pub fn to_record(&self) -> ProductRecord {
        let mut record = ProductRecord::from_value(Value::Object(self.fields.clone()))
            .unwrap_or_else(|e| {
                warn!(document = %self.id, error = %e, "document fields do not form a product");
                ProductRecord::default()
            });
        record.id = ProductId::new(self.id.clone());
        record
    }
}

/// Order newest first, the way every listing is delivered.
pub fn sort_newest_first(docs: &mut [StoredDocument]) {
    docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub fn to_records(docs: &[StoredDocument]) -> Vec<ProductRecord> {
    docs.iter().map(StoredDocument::to_record).collect()
}

/// Fingerprint of the products a listing delivers.
pub fn listing_fingerprint(docs: &[StoredDocument]) -> Fingerprint {
    fingerprint(&to_records(docs))
}
