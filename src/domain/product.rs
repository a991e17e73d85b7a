use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::domain::value_objects::{lenient_text, ProductId};

/// One row of a spreadsheet before it is typed: header → cell value.
pub type RawRecord = BTreeMap<String, Value>;

/// Column headers that every uploaded sheet must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["ProductId", "Image Url", "Product Desc", "Promotion Url"];

/// Column headers recognised but not required.
pub const OPTIONAL_COLUMNS: [&str; 6] = [
    "Origin Price",
    "Discount Price",
    "Commission Rate",
    "Positive Feedback",
    "Coupon Info",
    "Video Url",
];

/// A price or percentage cell: a number when the sheet stored one, text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    /// Numeric reading of the cell. Text is parsed from its leading number,
    /// so `"12.50 USD"` reads as `12.5` and `"US $3"` does not read at all.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            Scalar::Text(s) => leading_number(s),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Scalar::Text(s) if s.trim().is_empty())
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Number(n) => n.fmt(f),
            Scalar::Text(s) => s.fmt(f),
        }
    }
}

fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            c if c.is_ascii_digit() => {}
            _ => break,
        }
        end = i + c.len_utf8();
    }
    s[..end].parse().ok()
}

/// One affiliate product.
///
/// JSON keys are the upload column headers, which keeps the local snapshot,
/// the export file and every remote document in the same shape. Keys the
/// catalog does not know about are carried in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "ProductId", default)]
    pub id: ProductId,

    #[serde(
        rename = "Image Url",
        default,
        deserialize_with = "lenient_text::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,

    #[serde(
        rename = "Product Desc",
        default,
        deserialize_with = "lenient_text::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(rename = "Origin Price", default, skip_serializing_if = "Option::is_none")]
    pub origin_price: Option<Scalar>,

    #[serde(rename = "Discount Price", default, skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<Scalar>,

    #[serde(
        rename = "Promotion Url",
        default,
        deserialize_with = "lenient_text::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub promotion_url: Option<String>,

    #[serde(rename = "Commission Rate", default, skip_serializing_if = "Option::is_none")]
    pub commission_rate: Option<Scalar>,

    #[serde(rename = "Positive Feedback", default, skip_serializing_if = "Option::is_none")]
    pub positive_feedback: Option<Scalar>,

    #[serde(
        rename = "Coupon Info",
        default,
        deserialize_with = "lenient_text::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub coupon_info: Option<String>,

    #[serde(
        rename = "Video Url",
        default,
        deserialize_with = "lenient_text::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub video_url: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProductRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(id),
            ..Self::default()
        }
    }

    /// Type a raw spreadsheet row.
    pub fn from_raw(raw: RawRecord) -> serde_json::Result<Self> {
        Self::from_value(Value::Object(raw.into_iter().collect()))
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// The record as a JSON object, the shape document stores persist.
    pub fn to_fields(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            // A struct with named fields always serializes to an object.
            _ => Ok(Map::new()),
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_url.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}
