use serde::{Deserialize, Deserializer, Serialize};

/// Unique key of a product inside one collection.
///
/// Spreadsheets frequently store ids as numbers, so deserialization accepts
/// any scalar and keeps its textual form. A missing or `null` id becomes
/// the empty id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(lenient_text::optional(deserializer)?.unwrap_or_default()))
    }
}

/// SHA-256 hex fingerprint of a product collection.
///
/// Computed by [`crate::fingerprint`]. Two collections with the same records
/// in the same order share a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Returns the raw hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, enough to tell snapshots apart in logs.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Name of the single slot the local snapshot lives under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(pub String);

impl Default for StorageKey {
    fn default() -> Self {
        Self("catalog-products".to_string())
    }
}

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deserializers for text columns that may arrive as numbers or booleans.
pub(crate) mod lenient_text {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Text(String),
        Number(serde_json::Number),
        Bool(bool),
    }

    impl Loose {
        fn into_text(self) -> String {
            match self {
                Loose::Text(s) => s,
                Loose::Number(n) => n.to_string(),
                Loose::Bool(b) => b.to_string(),
            }
        }
    }

    pub fn optional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Loose>::deserialize(deserializer)?.map(Loose::into_text))
    }
}
