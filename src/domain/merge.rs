use std::collections::HashSet;

use crate::domain::product::{ProductRecord, RawRecord, OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
use crate::domain::value_objects::ProductId;

/// Required columns absent from the first row of a batch.
///
/// Only the first row is checked: it stands in for the sheet's header.
pub fn missing_columns(batch: &[RawRecord]) -> Vec<String> {
    let Some(first) = batch.first() else {
        return REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    };
    REQUIRED_COLUMNS
        .iter()
        .filter(|col| !first.contains_key(**col))
        .map(|col| col.to_string())
        .collect()
}

/// Headers of the first row that the catalog does not recognise. Their
/// cells are still kept, as extra fields of each product.
pub fn unknown_columns(batch: &[RawRecord]) -> Vec<String> {
    let Some(first) = batch.first() else {
        return Vec::new();
    };
    first
        .keys()
        .filter(|col| {
            !REQUIRED_COLUMNS.contains(&col.as_str()) && !OPTIONAL_COLUMNS.contains(&col.as_str())
        })
        .cloned()
        .collect()
}

/// Incoming records whose identifier is not already in `existing`.
///
/// First write wins: an identifier already present is never refreshed, and
/// when the batch repeats an identifier only its first occurrence survives.
pub fn deduplicate(existing: &[ProductRecord], incoming: Vec<ProductRecord>) -> Vec<ProductRecord> {
    let mut seen: HashSet<ProductId> = existing.iter().map(|p| p.id.clone()).collect();
    incoming
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

/// Result of merging a batch into a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    /// Existing records followed by the surviving new ones.
    pub merged: Vec<ProductRecord>,
    /// How many incoming records survived deduplication.
    pub added: usize,
}

/// Append the new records of `incoming` to `existing`.
pub fn merge(existing: &[ProductRecord], incoming: Vec<ProductRecord>) -> Merge {
    let fresh = deduplicate(existing, incoming);
    let added = fresh.len();
    let mut merged = Vec::with_capacity(existing.len() + added);
    merged.extend_from_slice(existing);
    merged.extend(fresh);
    Merge { merged, added }
}

/// `records` without the product `id`. Unknown ids leave the list unchanged.
pub fn without(records: Vec<ProductRecord>, id: &ProductId) -> Vec<ProductRecord> {
    records.into_iter().filter(|p| &p.id != id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(id: &str, desc: &str) -> ProductRecord {
        ProductRecord {
            description: Some(desc.to_string()),
            ..ProductRecord::new(id)
        }
    }

    fn raw(pairs: &[(&str, serde_json::Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn existing_record_wins_over_incoming_duplicate() {
        let existing = vec![product("A", "original")];
        let incoming = vec![product("A", "updated"), product("B", "new")];

        let m = merge(&existing, incoming);

        assert_eq!(m.added, 1);
        assert_eq!(m.merged.len(), 2);
        assert_eq!(m.merged[0], product("A", "original"));
        assert_eq!(m.merged[1].id.as_str(), "B");
    }

    #[test]
    fn merged_ids_are_unique_and_existing_preserved() {
        let existing = vec![product("A", "a"), product("B", "b"), product("C", "c")];
        let incoming = vec![
            product("C", "c2"),
            product("D", "d"),
            product("D", "d2"),
            product("A", "a2"),
            product("E", "e"),
        ];

        let m = merge(&existing, incoming);

        let ids: HashSet<&str> = m.merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), m.merged.len());
        assert_eq!(&m.merged[..3], &existing[..]);
        assert_eq!(m.added, 2);
        assert_eq!(m.merged[3], product("D", "d"));
    }

    #[test]
    fn all_duplicates_adds_nothing() {
        let existing = vec![product("A", "a")];
        let m = merge(&existing, vec![product("A", "x")]);
        assert_eq!(m.added, 0);
        assert_eq!(m.merged, existing);
    }

    #[test]
    fn missing_columns_reports_each_absent_header() {
        let batch = vec![raw(&[("ProductId", json!("1")), ("Image Url", json!("u"))])];
        assert_eq!(missing_columns(&batch), vec!["Product Desc", "Promotion Url"]);
    }

    #[test]
    fn unrecognised_headers_are_reported() {
        let batch = vec![raw(&[
            ("ProductId", json!("1")),
            ("Video Url", json!("v")),
            ("Shipping", json!("free")),
            ("Brand", json!("Acme")),
        ])];
        assert_eq!(unknown_columns(&batch), vec!["Brand", "Shipping"]);
        assert!(unknown_columns(&[]).is_empty());
    }

    #[test]
    fn only_first_row_is_checked() {
        let batch = vec![
            raw(&[
                ("ProductId", json!("1")),
                ("Image Url", json!("u")),
                ("Product Desc", json!("d")),
                ("Promotion Url", json!("p")),
            ]),
            raw(&[("ProductId", json!("2"))]),
        ];
        assert!(missing_columns(&batch).is_empty());
    }

    #[test]
    fn without_unknown_id_is_noop() {
        let records = vec![product("A", "a"), product("B", "b")];
        assert_eq!(without(records.clone(), &ProductId::from("Z")), records);
        assert_eq!(without(records, &ProductId::from("B")), vec![product("A", "a")]);
    }
}
