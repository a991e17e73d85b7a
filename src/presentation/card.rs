use serde::Serialize;

use crate::domain::product::{ProductRecord, Scalar};

const NO_DESCRIPTION: &str = "No description available";

/// Display-ready fields of one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub id: String,
    pub title: String,
    pub image_url: Option<String>,
    /// Price shown prominently: the discounted one.
    pub price: Option<String>,
    /// Struck-through original price, shown when it differs.
    pub was_price: Option<String>,
    /// e.g. `"25% OFF"`.
    pub discount_label: Option<String>,
    pub commission: Option<String>,
    pub rating: Option<String>,
    pub coupon: Option<String>,
    pub buy_url: Option<String>,
    pub video_url: Option<String>,
}

impl CardView {
    pub fn from_record(record: &ProductRecord) -> Self {
        let origin = present(record.origin_price.as_ref());
        let discount = present(record.discount_price.as_ref());
        Self {
            id: record.id.to_string(),
            title: record
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            image_url: non_blank(record.image_url.as_deref()),
            price: discount.map(|p| format_price(Some(p))),
            was_price: origin
                .filter(|o| Some(*o) != discount)
                .map(|o| format_price(Some(o))),
            discount_label: discount_label(origin, discount),
            commission: present(record.commission_rate.as_ref()).map(|c| format!("{c}%")),
            rating: present(record.positive_feedback.as_ref()).map(|r| format!("{r}%")),
            coupon: non_blank(record.coupon_info.as_deref()),
            buy_url: non_blank(record.promotion_url.as_deref()),
            video_url: record.has_video().then(|| record.video_url.clone()).flatten(),
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_url.is_some()
    }
}

/// `$12.50` for numbers, the text itself otherwise, `N/A` when absent or zero.
pub fn format_price(price: Option<&Scalar>) -> String {
    match present(price) {
        None => "N/A".to_string(),
        Some(Scalar::Number(n)) => match n.as_f64() {
            Some(v) => format!("${v:.2}"),
            None => n.to_string(),
        },
        Some(Scalar::Text(s)) => s.clone(),
    }
}

/// Whole-percent saving, only when positive.
pub fn discount_label(origin: Option<&Scalar>, discount: Option<&Scalar>) -> Option<String> {
    let original = present(origin)?.as_f64()?;
    let discounted = present(discount)?.as_f64()?;
    if original == 0.0 {
        return None;
    }
    let percentage = ((original - discounted) / original * 100.0).round();
    (percentage > 0.0).then(|| format!("{percentage:.0}% OFF"))
}

/// Absent, blank or zero values count as not set.
fn present(value: Option<&Scalar>) -> Option<&Scalar> {
    value.filter(|v| match v {
        Scalar::Number(n) => n.as_f64() != Some(0.0),
        Scalar::Text(_) => !v.is_blank(),
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
